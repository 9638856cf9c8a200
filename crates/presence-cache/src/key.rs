use presence_core::types::EpochId;

/// Width of the zero-padded epoch number in a key; keeps keys ordered by epoch.
const EPOCH_WIDTH: usize = 20;

/// Flat key layout: `<epoch_id:020>/<key>`.
///
/// The separator after a fixed-width epoch number means one epoch's prefix
/// can never match another epoch's keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(epoch_id: EpochId, key: &str) -> Self {
        Self(format!("{}{}", Self::prefix(epoch_id), key))
    }

    pub fn prefix(epoch_id: EpochId) -> String {
        format!("{:0width$}/", epoch_id.inner(), width = EPOCH_WIDTH)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Recover the epoch from a raw stored key.
    pub fn epoch_of(raw: &[u8]) -> Option<EpochId> {
        let digits = raw.get(..EPOCH_WIDTH)?;
        if raw.get(EPOCH_WIDTH) != Some(&b'/') {
            return None;
        }
        std::str::from_utf8(digits).ok()?.parse().ok().map(EpochId::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let k = CacheKey::new(EpochId::new(42), "post:7");
        assert_eq!(k.as_str(), "00000000000000000042/post:7");
        assert_eq!(CacheKey::epoch_of(k.as_bytes()), Some(EpochId::new(42)));
        assert!(k.as_str().starts_with(&CacheKey::prefix(EpochId::new(42))));
        assert!(!k.as_str().starts_with(&CacheKey::prefix(EpochId::new(4))));
    }

    #[test]
    fn foreign_keys_rejected() {
        assert_eq!(CacheKey::epoch_of(b"short"), None);
        assert_eq!(CacheKey::epoch_of(b"0000000000000000004x/a"), None);
        assert_eq!(CacheKey::epoch_of(b"00000000000000000042-a"), None);
    }
}
