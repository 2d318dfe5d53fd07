pub mod ai;
pub mod dialogue;
pub mod memory;
pub mod messaging;
pub mod oracle;
pub mod tools;
