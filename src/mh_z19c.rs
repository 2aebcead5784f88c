use std::time::Duration;

use anyhow::Context;
use rppal::uart::{Parity, Uart};

pub const BAUD_RATE: u32 = 9600;
pub const FRAME_LEN: usize = 9;

pub const READ_COMMAND: [u8; FRAME_LEN] = [0xff, 0x01, 0x86, 0x00, 0x00, 0x00, 0x00, 0x00, 0x79];

pub const START_BYTE: u8 = 0xff;
pub const READ_CO2: u8 = 0x86;

/// MH-Z19C CO2 sensor on the primary UART.
#[derive(Debug)]
pub struct MHZ19C {
    uart: Uart,
}

impl MHZ19C {
    pub fn new() -> Result<MHZ19C, anyhow::Error> {
        let mut uart =
            Uart::new(BAUD_RATE, Parity::None, 8, 1).context("Failed to initialize UART")?;
        uart.set_read_mode(FRAME_LEN as u8, Duration::from_millis(10))
            .context("Failed to set read mode")?;

        Ok(MHZ19C { uart })
    }

    /// Drops anything left over from an earlier, interrupted exchange.
    pub fn init(&mut self) -> Result<(), anyhow::Error> {
        self.uart
            .flush(rppal::uart::Queue::Both)
            .context("Failed to flush UART queues")?;
        Ok(())
    }

    pub fn read_co2_concentration(&mut self) -> Result<u16, anyhow::Error> {
        self.uart
            .write(&READ_COMMAND)
            .context("Failed to write command to UART")?;

        let mut frame = [0u8; FRAME_LEN];
        let read = self
            .uart
            .read(&mut frame)
            .context("Failed to read response from UART")?;
        anyhow::ensure!(
            read == FRAME_LEN,
            "Short response: expected {FRAME_LEN} bytes, got {read}"
        );

        parse_co2_response(&frame)
    }
}

/// Extracts the concentration in ppm from a read-CO2 response frame.
pub fn parse_co2_response(frame: &[u8; FRAME_LEN]) -> Result<u16, anyhow::Error> {
    if frame[0] != START_BYTE || frame[1] != READ_CO2 {
        anyhow::bail!(
            "Invalid response: expected start byte {START_BYTE:#04x} and command {READ_CO2:#04x}, got {:#04x} and {:#04x}",
            frame[0],
            frame[1]
        );
    }

    let expected = checksum(frame);
    if frame[8] != expected {
        anyhow::bail!(
            "Invalid checksum: expected {expected:#04x}, got {:#04x}",
            frame[8]
        );
    }

    Ok(u16::from_be_bytes([frame[2], frame[3]]))
}

/// Two's complement of the sum of bytes 1..=7.
pub fn checksum(frame: &[u8; FRAME_LEN]) -> u8 {
    frame[1..8]
        .iter()
        .fold(0u8, |sum, &byte| sum.wrapping_add(byte))
        .wrapping_neg()
}
