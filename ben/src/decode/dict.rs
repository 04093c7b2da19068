use std::fmt;

use super::{Entry, List, ListIter};

#[derive(Clone, Copy)]
pub struct Dict<'b, 'p> {
    pub(crate) entry: Entry<'b, 'p>,
}

impl<'b, 'p> Dict<'b, 'p> {
    /// Key-value pairs in input order.
    pub fn iter(&self) -> DictIter<'b, 'p> {
        DictIter {
            items: List { entry: self.entry }.iter(),
        }
    }

    pub fn as_raw_bytes(&self) -> &'b [u8] {
        self.entry.as_raw_bytes()
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Entry<'b, 'p>> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn get_dict(&self, key: &str) -> Option<Dict<'b, 'p>> {
        self.get(key)?.as_dict()
    }

    pub fn get_list(&self, key: &str) -> Option<List<'b, 'p>> {
        self.get(key)?.as_list()
    }

    pub fn get_bytes(&self, key: &str) -> Option<&'b [u8]> {
        self.get(key)?.as_bytes()
    }

    pub fn get_str(&self, key: &str) -> Option<&'b str> {
        self.get(key)?.as_str()
    }

    pub fn get_int<I>(&self, key: &str) -> Option<I>
    where
        I: TryFrom<i64>,
    {
        self.get(key)?.as_int()
    }

    pub fn is_empty(&self) -> bool {
        List { entry: self.entry }.is_empty()
    }
}

impl<'b, 'p> IntoIterator for Dict<'b, 'p> {
    type Item = (&'b str, Entry<'b, 'p>);
    type IntoIter = DictIter<'b, 'p>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for Dict<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

pub struct DictIter<'b, 'p> {
    items: ListIter<'b, 'p>,
}

impl<'b, 'p> Iterator for DictIter<'b, 'p> {
    type Item = (&'b str, Entry<'b, 'p>);

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.items.next()?;
        let value = self.items.next()?;
        // Keys were checked for UTF-8 while parsing
        Some((key.as_str()?, value))
    }
}
