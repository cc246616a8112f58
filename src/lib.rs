pub mod cegis;
pub mod demo;
pub mod encoding;
pub mod error;
pub mod expr;
pub mod generate;
pub mod learn;
pub mod local;
pub mod oracle;
pub mod problem;
pub mod simplify;
pub mod sygus;
pub mod verify;
