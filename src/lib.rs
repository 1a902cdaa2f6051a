#[macro_use]
extern crate lazy_static;
extern crate hex;

#[macro_use]
extern crate log;

pub mod iso8583;
