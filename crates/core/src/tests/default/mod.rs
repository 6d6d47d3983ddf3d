mod test_connection;
mod test_forward;
mod test_pubsub;
mod test_ring;
