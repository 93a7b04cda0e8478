pub mod ports;
pub mod services;
pub mod session;
pub mod use_cases;

#[cfg(test)]
pub(crate) mod test_support;
