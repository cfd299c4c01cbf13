mod interfaces;

pub use interfaces::{select_ipv6_interfaces, usable_interfaces};
