//! Server configuration, with a chained-setter builder in the same shape
//! the node factory used for its own `Configuration`.

#[derive(Clone, Debug)]
pub struct Configuration {
    pub port: u16,
    pub max_message_bytes: usize,
    pub max_args: usize,
    pub read_chunk_bytes: usize,
    pub rehash_batch_size: usize,
    pub rehash_load_factor: usize,
}

impl Default for Configuration {
    fn default() -> Configuration {
        Configuration {
            port: 1234,
            max_message_bytes: 32 << 20,
            max_args: 200_000,
            read_chunk_bytes: 64 << 10,
            rehash_batch_size: crate::map::DEFAULT_REHASH_BATCH_SIZE,
            rehash_load_factor: crate::map::DEFAULT_REHASH_LOAD_FACTOR,
        }
    }
}

/// Builds a [`Configuration`] via chained setters, defaulting to the same
/// values as `Configuration::default()`.
pub struct Factory {
    configuration: Configuration,
}

impl Default for Factory {
    fn default() -> Self {
        Self::new()
    }
}

impl Factory {
    pub fn new() -> Self {
        Factory { configuration: Default::default() }
    }

    pub fn build(self) -> Configuration {
        self.configuration
    }

    /// TCP port the server listens on.
    pub fn port(mut self, port: u16) -> Self {
        self.configuration.port = port;
        self
    }

    /// Largest request/response frame body accepted, in bytes. A declared
    /// frame length over this is a framing error, closing the connection.
    pub fn max_message_bytes(mut self, max_message_bytes: usize) -> Self {
        self.configuration.max_message_bytes = max_message_bytes;
        self
    }

    /// Largest argument count accepted in a single request.
    pub fn max_args(mut self, max_args: usize) -> Self {
        self.configuration.max_args = max_args;
        self
    }

    /// Size of each `read()` into a connection's incoming buffer.
    pub fn read_chunk_bytes(mut self, read_chunk_bytes: usize) -> Self {
        self.configuration.read_chunk_bytes = read_chunk_bytes;
        self
    }

    /// Migration steps performed per mutating call on any hash map built
    /// from this configuration (the keyspace and each sorted set's name
    /// index).
    pub fn rehash_batch_size(mut self, rehash_batch_size: usize) -> Self {
        self.configuration.rehash_batch_size = rehash_batch_size;
        self
    }

    /// Entries per bucket that triggers a resize.
    pub fn rehash_load_factor(mut self, rehash_load_factor: usize) -> Self {
        self.configuration.rehash_load_factor = rehash_load_factor;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Configuration::default();
        assert_eq!(config.port, 1234);
        assert_eq!(config.max_message_bytes, 32 << 20);
        assert_eq!(config.max_args, 200_000);
        assert_eq!(config.rehash_batch_size, 256);
        assert_eq!(config.rehash_load_factor, 16);
    }

    #[test]
    fn factory_overrides_chain() {
        let config = Factory::new().port(9999).max_args(10).rehash_batch_size(8).rehash_load_factor(4).build();
        assert_eq!(config.port, 9999);
        assert_eq!(config.max_args, 10);
        assert_eq!(config.max_message_bytes, 32 << 20);
        assert_eq!(config.rehash_batch_size, 8);
        assert_eq!(config.rehash_load_factor, 4);
    }
}
