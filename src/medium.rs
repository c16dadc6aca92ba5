//! The physical transport family a channel rides on, and the reasons a
//! channel can be torn down.

use strum::Display;

/// Physical transport family. `GetType()` (see [`crate::channel`])
/// renders this mechanically via [`Display`], so a new variant never
/// needs a hand-written type-string mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Medium {
    Ble,
    Bluetooth,
    WifiLan,
    WifiAware,
    WebRtc,
    Usb,
    Unknown,
}

/// Why a channel was closed, exposed to observers (e.g. the
/// connection manager this crate does not itself implement — see
/// spec.md §1 Out of scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DisconnectionReason {
    UnknownDisconnectionReason,
    Upgraded,
    Shutdown,
    LocalDisconnection,
    RemoteDisconnection,
    IoError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn medium_type_strings() {
        assert_eq!(Medium::Ble.to_string(), "BLE");
        assert_eq!(Medium::Bluetooth.to_string(), "BLUETOOTH");
        assert_eq!(Medium::WifiLan.to_string(), "WIFI_LAN");
        assert_eq!(Medium::WifiAware.to_string(), "WIFI_AWARE");
        assert_eq!(Medium::WebRtc.to_string(), "WEB_RTC");
        assert_eq!(Medium::Usb.to_string(), "USB");
    }

    #[test]
    fn disconnection_reason_strings() {
        assert_eq!(
            DisconnectionReason::LocalDisconnection.to_string(),
            "LOCAL_DISCONNECTION"
        );
        assert_eq!(DisconnectionReason::IoError.to_string(), "IO_ERROR");
    }
}
