use crate::bytes::hash_bytes;
use crate::error::{Error, Result};
use crate::record::Record;

pub const KEY_LENGTH: usize = 16;
pub const VALUE_LENGTH: usize = 48;

/// Key/value pair stored by the shell. Both sides are UTF-8, zero padded to
/// a fixed width on disk.
#[derive(Debug, Clone)]
pub struct Entry {
    key: [u8; KEY_LENGTH],
    value: [u8; VALUE_LENGTH],
}

fn pad<const N: usize>(text: &str, what: &str) -> Result<[u8; N]> {
    let bytes = text.as_bytes();
    if bytes.len() > N {
        return Err(Error::InvalidArgument(format!(
            "{} `{}` is longer than {} bytes",
            what, text, N
        )));
    }
    if bytes.contains(&0) {
        return Err(Error::InvalidArgument(format!("{} contains a NUL byte", what)));
    }
    let mut out = [0; N];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

fn unpad(bytes: &[u8]) -> &str {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end]).unwrap_or_default()
}

impl Entry {
    pub fn new(key: &str, value: &str) -> Result<Self> {
        Ok(Self {
            key: pad(key, "key")?,
            value: pad(value, "value")?,
        })
    }

    /// An entry usable for lookups by `key`.
    pub fn key_only(key: &str) -> Result<Self> {
        Self::new(key, "")
    }

    pub fn key(&self) -> &str {
        unpad(&self.key)
    }

    pub fn value(&self) -> &str {
        unpad(&self.value)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Record for Entry {
    const BYTE_SIZE: usize = KEY_LENGTH + VALUE_LENGTH;

    fn write_bytes(&self, out: &mut [u8]) {
        out[..KEY_LENGTH].copy_from_slice(&self.key);
        out[KEY_LENGTH..Self::BYTE_SIZE].copy_from_slice(&self.value);
    }

    fn read_bytes(bytes: &[u8]) -> Result<Self> {
        let key = bytes.get(..KEY_LENGTH);
        let value = bytes.get(KEY_LENGTH..Self::BYTE_SIZE);
        match (key, value) {
            (Some(key), Some(value)) => {
                let entry = Self {
                    key: key.try_into().map_err(|_| Error::corruption("entry", "bad key"))?,
                    value: value
                        .try_into()
                        .map_err(|_| Error::corruption("entry", "bad value"))?,
                };
                if std::str::from_utf8(&entry.key).is_err() {
                    return Err(Error::corruption("entry", "key is not UTF-8"));
                }
                if std::str::from_utf8(&entry.value).is_err() {
                    return Err(Error::corruption("entry", "value is not UTF-8"));
                }
                Ok(entry)
            }
            _ => Err(Error::corruption(
                "entry",
                format!("need {} bytes, have {}", Self::BYTE_SIZE, bytes.len()),
            )),
        }
    }

    fn hash_code(&self) -> i32 {
        hash_bytes(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_value() {
        let a = Entry::new("apple", "red").unwrap();
        let b = Entry::new("apple", "green").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.hash_code(), b.hash_code());
        assert_ne!(a, Entry::key_only("pear").unwrap());
    }

    #[test]
    fn bytes_keep_key_and_value() {
        let entry = Entry::new("apple", "a fruit").unwrap();
        let mut bytes = vec![0; Entry::BYTE_SIZE];
        entry.write_bytes(&mut bytes);
        let read = Entry::read_bytes(&bytes).unwrap();
        assert_eq!(read.key(), "apple");
        assert_eq!(read.value(), "a fruit");
    }

    #[test]
    fn invalid_utf8_on_disk_is_corruption() {
        let mut bytes = vec![0; Entry::BYTE_SIZE];
        Entry::new("apple", "ok").unwrap().write_bytes(&mut bytes);
        bytes[KEY_LENGTH] = 0xFF;
        assert!(matches!(
            Entry::read_bytes(&bytes),
            Err(Error::Corruption { what: "entry", .. })
        ));

        bytes[KEY_LENGTH] = b'o';
        bytes[0] = 0xC3;
        assert!(matches!(
            Entry::read_bytes(&bytes),
            Err(Error::Corruption { .. })
        ));
        assert!(Entry::read_bytes(&bytes[..10]).is_err());
    }

    #[test]
    fn oversized_fields_are_rejected() {
        assert!(Entry::new(&"k".repeat(KEY_LENGTH + 1), "").is_err());
        assert!(Entry::new("k", &"v".repeat(VALUE_LENGTH + 1)).is_err());
        Entry::new(&"k".repeat(KEY_LENGTH), &"v".repeat(VALUE_LENGTH)).unwrap();
    }
}
