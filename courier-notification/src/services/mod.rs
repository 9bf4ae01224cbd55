pub mod audit;
pub mod channels;
pub mod dead_letters;
pub mod dispatcher;
pub mod processor;
pub mod push;
pub mod registry;
pub mod retention;
pub mod transition;
