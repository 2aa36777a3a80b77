pub mod evaluation_use_case;
pub mod ports;
