pub mod v1 {
    use jiff::Timestamp;
    use keyhole_core as core;
    use thiserror::Error;

    tonic::include_proto!("keygen.v1");

    /// Encoded descriptors of the keygen protos, for server reflection.
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("keygen_descriptor");

    #[derive(Error, Debug)]
    pub enum ConversionError {
        #[error("key is missing")]
        MissingKey,
        #[error("key expire time is missing")]
        MissingExpireTime,
        #[error("key expire time is out of range: {0}")]
        InvalidExpireTime(String),
    }

    impl From<core::Key> for Key {
        fn from(key: core::Key) -> Self {
            let expires_at = key.expires_at;
            Key {
                val: key.value,
                expire_time: Some(prost_types::Timestamp {
                    seconds: expires_at.as_second(),
                    nanos: expires_at.subsec_nanosecond(),
                }),
            }
        }
    }

    impl From<core::Key> for GenerateKeyResponse {
        fn from(key: core::Key) -> Self {
            GenerateKeyResponse {
                key: Some(key.into()),
            }
        }
    }

    impl TryFrom<Key> for core::Key {
        type Error = ConversionError;

        fn try_from(key: Key) -> Result<Self, Self::Error> {
            let expire_time = key.expire_time.ok_or(ConversionError::MissingExpireTime)?;
            let expires_at = Timestamp::new(expire_time.seconds, expire_time.nanos)
                .map_err(|e| ConversionError::InvalidExpireTime(e.to_string()))?;
            Ok(core::Key::new(key.val, expires_at))
        }
    }

    impl TryFrom<GenerateKeyResponse> for core::Key {
        type Error = ConversionError;

        fn try_from(response: GenerateKeyResponse) -> Result<Self, Self::Error> {
            response.key.ok_or(ConversionError::MissingKey)?.try_into()
        }
    }

}
