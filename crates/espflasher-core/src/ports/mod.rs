/// Serial port enumeration.
///
/// Stateless and synchronous: callers poll on their own interval (the
/// original UI refreshes every 2 s) to track hot-plug changes. Descriptors
/// are ephemeral — re-created on every enumeration, identified only by the
/// device string.
use serde::{Deserialize, Serialize};
use serialport::SerialPortType;
use tracing::warn;

/// One enumerated serial port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    /// OS device identifier, e.g. "/dev/ttyUSB0" or "COM3".
    pub device: String,
    /// Human-readable description derived from USB metadata, when known.
    pub description: String,
}

impl PortDescriptor {
    /// "device - description" label, as shown in port pickers.
    pub fn display_name(&self) -> String {
        if self.description.is_empty() {
            self.device.clone()
        } else {
            format!("{} - {}", self.device, self.description)
        }
    }
}

/// Enumerate the serial ports the OS currently reports.
///
/// The only failure mode is an empty list: an enumeration error is logged
/// and swallowed, matching a system with no ports attached.
pub fn list_ports() -> Vec<PortDescriptor> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("serial port enumeration failed: {e}");
            return Vec::new();
        }
    };

    ports
        .into_iter()
        .map(|info| {
            let description = match &info.port_type {
                SerialPortType::UsbPort(usb) => match (&usb.product, &usb.manufacturer) {
                    (Some(product), _) => product.clone(),
                    (None, Some(manufacturer)) => manufacturer.clone(),
                    (None, None) => String::from("USB serial device"),
                },
                SerialPortType::BluetoothPort => String::from("Bluetooth serial port"),
                SerialPortType::PciPort => String::from("PCI serial port"),
                SerialPortType::Unknown => String::new(),
            };
            PortDescriptor {
                device: info.port_name,
                description,
            }
        })
        .collect()
}
