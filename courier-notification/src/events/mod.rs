pub mod dead_letters;
pub mod publisher;
pub mod subscriber;
