//! Terminal identity (`GET /ISAPI/System/deviceInfo`).

use crate::response::Payload;
use rollcall_core::{Error, Result};

/// Model and firmware reported by a terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: Option<String>,
    pub model: String,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
}

impl DeviceInfo {
    /// # Errors
    /// Returns `Error::Validation` if the payload is not a `DeviceInfo`
    /// document with a `model` element.
    pub fn from_payload(payload: &Payload) -> Result<Self> {
        let doc = payload
            .as_xml()
            .ok_or_else(|| Error::validation("device info response is not XML"))?;
        Ok(Self {
            name: doc.value("deviceName"),
            model: doc
                .value("model")
                .ok_or_else(|| Error::validation("device info without model"))?,
            serial_number: doc.value("serialNumber"),
            firmware_version: doc.value("firmwareVersion"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlDocument;

    #[test]
    fn test_device_info() {
        let payload = Payload::Xml(XmlDocument::new(
            "<DeviceInfo version=\"2.0\"><deviceName>Lobby</deviceName><model>DS-K1T341AM</model>\
             <serialNumber>DS-K1T341AM20240101</serialNumber><firmwareVersion>V3.2.30</firmwareVersion></DeviceInfo>",
        ));
        let info = DeviceInfo::from_payload(&payload).unwrap();
        assert_eq!(info.model, "DS-K1T341AM");
        assert_eq!(info.firmware_version.as_deref(), Some("V3.2.30"));
    }
}
