use crate::utils::error::{Result, SatflowError};
use crate::utils::validation::{validate_range, Validate};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// 查詢範圍，順序為 (xmin, ymin, xmax, ymax)，即經度在前、緯度在後
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self> {
        let bbox = Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    pub fn from_slice(values: &[f64]) -> Result<Self> {
        match values {
            [min_lon, min_lat, max_lon, max_lat] => Self::new(*min_lon, *min_lat, *max_lon, *max_lat),
            _ => Err(SatflowError::InvalidConfigValueError {
                field: "bbox".to_string(),
                value: format!("{:?}", values),
                reason: "Expected exactly 4 values: min_lon,min_lat,max_lon,max_lat".to_string(),
            }),
        }
    }

    /// 封閉多邊形（逆時針，首尾相同），供 footprint 相交查詢使用
    pub fn to_wkt_polygon(&self) -> String {
        format!(
            "POLYGON (({x0} {y0}, {x1} {y0}, {x1} {y1}, {x0} {y1}, {x0} {y0}))",
            x0 = self.min_lon,
            y0 = self.min_lat,
            x1 = self.max_lon,
            y1 = self.max_lat
        )
    }

    pub fn to_wkt_multipoint(&self) -> String {
        format!(
            "MULTIPOINT ({} {}, {} {})",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

impl Validate for BoundingBox {
    fn validate(&self) -> Result<()> {
        validate_range("bbox.min_lon", self.min_lon, -180.0, 180.0)?;
        validate_range("bbox.max_lon", self.max_lon, -180.0, 180.0)?;
        validate_range("bbox.min_lat", self.min_lat, -90.0, 90.0)?;
        validate_range("bbox.max_lat", self.max_lat, -90.0, 90.0)?;

        if self.min_lon > self.max_lon || self.min_lat > self.max_lat {
            return Err(SatflowError::InvalidConfigValueError {
                field: "bbox".to_string(),
                value: self.to_string(),
                reason: "Minimum corner must not exceed maximum corner".to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

impl FromStr for BoundingBox {
    type Err = SatflowError;

    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<f64>()
                    .map_err(|e| SatflowError::InvalidConfigValueError {
                        field: "bbox".to_string(),
                        value: s.to_string(),
                        reason: format!("'{}' is not a number: {}", part.trim(), e),
                    })
            })
            .collect::<Result<Vec<f64>>>()?;
        Self::from_slice(&values)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(SatflowError::InvalidConfigValueError {
                field: "end_date".to_string(),
                value: end.to_string(),
                reason: format!("End date must not be before start date {}", start),
            });
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_date("start_date", start)?, parse_date("end_date", end)?)
    }
}

/// 接受 `YYYYMMDD` 或 `YYYY-MM-DD`
pub fn parse_date(field_name: &str, value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .map_err(|e| SatflowError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Expected YYYYMMDD or YYYY-MM-DD: {}", e),
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProductType {
    #[serde(rename = "S2MSI1C")]
    S2Msi1c,
    #[serde(rename = "landsat_8_c1")]
    Landsat8C1,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::S2Msi1c => "S2MSI1C",
            ProductType::Landsat8C1 => "landsat_8_c1",
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            ProductType::S2Msi1c => Provider::Copernicus,
            ProductType::Landsat8C1 => Provider::EarthExplorer,
        }
    }

    pub fn all() -> [ProductType; 2] {
        [ProductType::S2Msi1c, ProductType::Landsat8C1]
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductType {
    type Err = SatflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "S2MSI1C" => Ok(ProductType::S2Msi1c),
            "landsat_8_c1" => Ok(ProductType::Landsat8C1),
            other => Err(SatflowError::InvalidConfigValueError {
                field: "product_type".to_string(),
                value: other.to_string(),
                reason: "Product type value is not currently supported.".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Copernicus,
    EarthExplorer,
}

impl Provider {
    /// 下載根目錄下的子目錄名稱
    pub fn output_subdir(&self) -> &'static str {
        match self {
            Provider::Copernicus => "sentinel",
            Provider::EarthExplorer => "landsat",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Copernicus => f.write_str("Copernicus"),
            Provider::EarthExplorer => f.write_str("EarthExplorer"),
        }
    }
}

pub type Properties = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentinelProduct {
    pub uuid: String,
    pub title: String,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandsatScene {
    pub entity_id: String,
    pub display_id: Option<String>,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Product {
    Sentinel(SentinelProduct),
    Landsat(LandsatScene),
}

impl Product {
    /// 依欄位判斷產品來源：有 `uuid` 是 Sentinel，有 `entity_id` 是 Landsat
    pub fn from_record(record: &serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        let text = |key: &str| record.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let properties: Properties = record
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if let Some(uuid) = text("uuid") {
            Ok(Product::Sentinel(SentinelProduct {
                title: text("title").unwrap_or_else(|| uuid.clone()),
                uuid,
                properties,
            }))
        } else if let Some(entity_id) = text("entity_id") {
            Ok(Product::Landsat(LandsatScene {
                display_id: text("display_id"),
                entity_id,
                properties,
            }))
        } else {
            Err(SatflowError::ProcessingError {
                message: "Unknown product type".to_string(),
            })
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            Product::Sentinel(_) => Provider::Copernicus,
            Product::Landsat(_) => Provider::EarthExplorer,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Product::Sentinel(p) => &p.uuid,
            Product::Landsat(s) => &s.entity_id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Product::Sentinel(p) => &p.title,
            Product::Landsat(s) => s.display_id.as_deref().unwrap_or(&s.entity_id),
        }
    }

    pub fn properties(&self) -> &Properties {
        match self {
            Product::Sentinel(p) => &p.properties,
            Product::Landsat(s) => &s.properties,
        }
    }

    pub fn acquisition_date(&self) -> Option<String> {
        match self {
            Product::Sentinel(_) => self.property_str("beginposition"),
            Product::Landsat(_) => self.property_str("acquisition_date"),
        }
    }

    pub fn cloud_cover(&self) -> Option<String> {
        match self {
            Product::Sentinel(_) => self.property_str("cloudcoverpercentage"),
            Product::Landsat(_) => self.property_str("cloud_cover"),
        }
    }

    pub fn property_str(&self, key: &str) -> Option<String> {
        self.properties().get(key).map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub product_type: ProductType,
    pub bbox: BoundingBox,
    pub dates: DateRange,
}
