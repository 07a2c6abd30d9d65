pub mod checkpoint;
pub mod extract;
pub mod harvest;
pub mod progress;
pub mod queries;
pub mod search;
pub mod urls;
pub mod verify;
