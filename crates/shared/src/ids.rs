macro_rules! define_id {
    ($name:ident) => {
        /// Opaque string identifier as assigned by the conversation store.
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::HealioError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.is_empty() {
                    return Err(crate::error::HealioError::Validation(format!(
                        "{} must not be empty",
                        stringify!($name)
                    )));
                }
                Ok(Self(s.to_string()))
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

define_id!(ConversationId);
define_id!(MessageId);
define_id!(UserId);

impl MessageId {
    /// Generate a new time-sortable UUID v7 identifier.
    ///
    /// Only the store assigns message ids; clients never pick their own.
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }
}
