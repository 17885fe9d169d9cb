//! Protocol constants

/// Discovery protocol version written on every DDP datagram
pub const DDP_VERSION: &str = "00020020";

/// Status line of an awake device
pub const STATUS_AWAKE: &str = "200 Ok";

/// Status line of a device in standby
pub const STATUS_STANDBY: &str = "620 Server Standby";

/// Broadcast address used for device search
pub const BROADCAST_ADDR: [u8; 4] = [255, 255, 255, 255];

/// Magic word following the passcode slot in the login packet
pub const LOGIN_MAGIC: i32 = 513;

/// Defaults written into the login packet
pub mod login {
    pub const APP_LABEL: &str = "PlayStation";
    pub const OS_VERSION: &str = "4.4";
    pub const MODEL_NAME: &str = "PS4 Waker";
}

/// Fixed field widths (bytes)
pub mod widths {
    pub const PASS_CODE: usize = 4;
    pub const ACCOUNT_ID: usize = 64;
    pub const APP_LABEL: usize = 256;
    pub const OS_VERSION: usize = 16;
    pub const MODEL: usize = 16;
    pub const PIN_CODE: usize = 16;
    pub const TITLE_ID: usize = 16;
    pub const SEED: usize = 16;
    pub const WRAPPED_KEY: usize = 256;
}

/// Total packet lengths (header included)
pub mod lengths {
    pub const CLIENT_HELLO: usize = 28;
    pub const HANDSHAKE: usize = 280;
    pub const LOGIN: usize = 384;
    pub const STATUS: usize = 12;
    pub const BOOT_REQUEST: usize = 24;
    pub const REMOTE_CONTROL: usize = 16;
    pub const OSK_CONTROL: usize = 12;
    pub const EMPTY: usize = 8;
    pub const SERVER_HELLO: usize = 36;
    pub const OSK_CHANGE_FIXED: usize = 28;
}

/// Discovery field keys
pub mod keys {
    pub const HOST_ID: &str = "host-id";
    pub const HOST_NAME: &str = "host-name";
    pub const HOST_TYPE: &str = "host-type";
    pub const HOST_REQUEST_PORT: &str = "host-request-port";
    pub const PROTOCOL_VERSION: &str = "device-discovery-protocol-version";
    pub const SYSTEM_VERSION: &str = "system-version";
    pub const RUNNING_APP_TITLE_ID: &str = "running-app-titleid";
    pub const RUNNING_APP_NAME: &str = "running-app-name";
}
