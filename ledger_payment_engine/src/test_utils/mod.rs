pub mod fakes;
#[cfg(test)]
pub mod http_stub;
pub mod prepare_env;
