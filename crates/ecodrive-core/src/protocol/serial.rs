//! Transport openers
//!
//! Serial ports (USB and Bluetooth SPP/rfcomm adapters) and TCP sockets
//! (Wi-Fi adapters). Both produce a [`BoxedTransport`].

use serialport::{SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info};

use super::{BoxedTransport, ProtocolError, DEFAULT_BAUD_RATE};

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/rfcomm0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,

    /// Whether the OS reports this as a Bluetooth serial link
    pub bluetooth: bool,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, product, bluetooth) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => {
                (Some(usb_info.vid), Some(usb_info.pid), usb_info.product, false)
            }
            SerialPortType::BluetoothPort => (None, None, None, true),
            _ => (None, None, None, false),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            product,
            bluetooth,
        }
    }
}

/// Sort key: Bluetooth rfcomm links first, then USB serial, then the rest
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    for (rank, prefix) in [(0u8, "rfcomm"), (1, "ttyUSB"), (2, "ttyACM")] {
        if let Some(rest) = basename.strip_prefix(prefix) {
            let num = rest.parse::<usize>().unwrap_or(usize::MAX);
            return (rank, num, basename.to_string());
        }
    }
    (3, 0, basename.to_string())
}

/// List available serial ports in a deterministic order
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        let p = PortInfo::from(info);
        map.entry(p.name.clone()).or_insert(p);
    }

    // Bound rfcomm devices are not always reported by the enumeration API
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("rfcomm") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone()).or_insert_with(|| PortInfo {
                        name: full,
                        vid: None,
                        pid: None,
                        product: None,
                        bluetooth: true,
                    });
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.name));
    v
}

/// Open a serial port as an async transport (8N1, no flow control)
pub fn open_port(name: &str, baud_rate: Option<u32>) -> Result<BoxedTransport, ProtocolError> {
    let baud = baud_rate.unwrap_or(DEFAULT_BAUD_RATE);
    let stream = tokio_serial::new(name, baud)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    info!(port = name, baud, "serial port opened");
    Ok(Box::new(stream))
}

/// Connect to a Wi-Fi adapter
pub async fn open_tcp(addr: &str, connect_timeout: Duration) -> Result<BoxedTransport, ProtocolError> {
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| ProtocolError::ConnectionFailed(format!("timed out connecting to {addr}")))?
        .map_err(|e| ProtocolError::ConnectionFailed(format!("{addr}: {e}")))?;
    stream.set_nodelay(true)?;
    debug!(addr, "tcp link established");
    Ok(Box::new(stream))
}
