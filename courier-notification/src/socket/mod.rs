pub mod gateway;
pub mod handlers;

/// Every socket joins its own room so a push can address one connection.
pub fn connection_room(connection_id: &str) -> String {
    format!("conn:{connection_id}")
}
