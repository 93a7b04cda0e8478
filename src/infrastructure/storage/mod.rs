mod core;
mod drive_port_impl;
#[cfg(test)]
mod fake_drive;
mod filesystem_port_impl;
mod http_port_impl;
pub use self::core::*;
pub mod drive {
    pub use super::drive_port_impl::*;
}
pub mod filesystem {
    pub use super::filesystem_port_impl::*;
}
pub mod http {
    pub use super::http_port_impl::*;
}
