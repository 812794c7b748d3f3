pub mod consistency;
pub mod screen;
