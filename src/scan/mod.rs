pub mod controller;
pub mod qr;
pub mod window;

pub use controller::{QrDecoder, QrHit, ScanController, ScanEvent};
pub use qr::{LumaQrDecoder, QrMatrix};
pub use window::{CameraFrame, ScanMode, ScanSettings, ScanWindow};
