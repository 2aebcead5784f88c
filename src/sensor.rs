use std::time::Duration;

use anyhow::Context as _;
use backon::{BlockingRetryable, ConstantBuilder};
use bme280::i2c::BME280;
use chrono::{DateTime, Local};
use rppal::{hal::Delay, i2c::I2c};

use crate::{config::SensorConfig, measurement::Measurement, mh_z19c::MHZ19C};

/// Produces one measurement per sampling cycle.
pub trait Sampler {
    /// Never fails: a sensor that cannot be read leaves its fields empty.
    fn sample(&mut self) -> Measurement;
}

fn retry_policy() -> ConstantBuilder {
    ConstantBuilder::default()
        .with_delay(Duration::from_millis(100))
        .with_max_times(20)
}

fn log_retry<E: std::fmt::Display>(e: &E, dur: Duration) {
    log::error!("{e}");
    log::info!("Retrying in {:?}", dur);
}

/// BME280 and MH-Z19C attached to a Raspberry Pi. Either may be disabled.
#[derive(Debug)]
pub struct Sensor {
    bme280: Option<BME280<I2c>>,
    mhz19c: Option<MHZ19C>,
    last_timestamp: Option<DateTime<Local>>,
}

impl Sensor {
    pub fn new(config: &SensorConfig) -> Result<Sensor, anyhow::Error> {
        let bme280 = if config.bme280 {
            let i2c = I2c::new().context("Failed to initialize I2C")?;
            Some(BME280::new_primary(i2c))
        } else {
            log::info!("BME280 disabled");
            None
        };

        let mhz19c = if config.mh_z19c {
            Some(MHZ19C::new().context("Failed to initialize MH-Z19C")?)
        } else {
            log::info!("MH-Z19C disabled");
            None
        };

        Ok(Sensor {
            bme280,
            mhz19c,
            last_timestamp: None,
        })
    }

    pub fn init(&mut self) -> Result<(), anyhow::Error> {
        if let Some(bme280) = self.bme280.as_mut() {
            (|| bme280.init(&mut Delay))
                .retry(retry_policy())
                .notify(log_retry)
                .call()
                .context("Failed to initialize BME280")?;
        }

        if let Some(mhz19c) = self.mhz19c.as_mut() {
            (|| mhz19c.init())
                .retry(retry_policy())
                .notify(log_retry)
                .call()
                .context("Failed to initialize MH-Z19C")?;
        }

        Ok(())
    }

    /// Wall-clock time, held at the previous sample's time if the clock
    /// stepped backwards.
    fn timestamp(&mut self) -> DateTime<Local> {
        let now = Local::now();
        let timestamp = match self.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_timestamp = Some(timestamp);
        timestamp
    }
}

impl Sampler for Sensor {
    fn sample(&mut self) -> Measurement {
        let mut measurement = Measurement {
            timestamp: self.timestamp(),
            ..Measurement::default()
        };

        if let Some(bme280) = self.bme280.as_mut() {
            match (|| bme280.measure(&mut Delay))
                .retry(retry_policy())
                .notify(log_retry)
                .call()
            {
                Ok(m) => {
                    measurement.temperature = Some(m.temperature);
                    measurement.humidity = Some(m.humidity);
                    measurement.pressure = Some(m.pressure);
                }
                Err(e) => log::error!("Failed to read BME280 measurements: {}", e),
            }
        }

        if let Some(mhz19c) = self.mhz19c.as_mut() {
            match mhz19c.read_co2_concentration() {
                Ok(co2_concentration) => measurement.co2_concentration = Some(co2_concentration),
                Err(e) => log::error!("Failed to read MH-Z19C CO2 concentration: {}", e),
            }
        }

        measurement
    }
}
