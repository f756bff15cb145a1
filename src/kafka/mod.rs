pub mod connection;
pub mod producer;


pub use connection::{KafkaConnection, KafkaConnectionFactory};
pub use producer::{KafkaMessageProducer, KafkaSession};
