use chrono::{DateTime, Local};

/// One sample. A field is `None` when its sensor is absent or the read failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurement {
    pub timestamp: DateTime<Local>,
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub pressure: Option<f32>,
    pub co2_concentration: Option<u16>,
    pub tvoc: Option<u16>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}
