use crate::error::{DriverError, DriverResult};

/// Out-of-band key/value pairs sent alongside a request and optionally
/// returned with its response. Keys keep insertion order; setting an existing
/// key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomPayload {
    items: Vec<(String, Vec<u8>)>,
}

impl CustomPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl AsRef<[u8]>) {
        let name = name.into();
        let value = value.as_ref().to_vec();
        match self.items.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value,
            None => self.items.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<u8>> {
        let position = self.items.iter().position(|(key, _)| key == name)?;
        Some(self.items.remove(position).1)
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.items
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_slice())
    }

    /// Returns the item stored at `index` as `(name, value)`.
    pub fn item(&self, index: usize) -> DriverResult<(&str, &[u8])> {
        self.items
            .get(index)
            .map(|(key, value)| (key.as_str(), value.as_slice()))
            .ok_or_else(|| DriverError::index_out_of_bounds(index, self.items.len()))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.items
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_slice()))
    }
}

impl<K, V> FromIterator<(K, V)> for CustomPayload
where
    K: Into<String>,
    V: AsRef<[u8]>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut payload = CustomPayload::new();
        for (name, value) in iter {
            payload.set(name, value);
        }
        payload
    }
}
