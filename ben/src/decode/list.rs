use std::fmt;

use super::Entry;

#[derive(Clone, Copy)]
pub struct List<'b, 'p> {
    pub(crate) entry: Entry<'b, 'p>,
}

impl<'b, 'p> List<'b, 'p> {
    pub fn iter(&self) -> ListIter<'b, 'p> {
        let (index, end) = self.entry.children();
        ListIter {
            entry: self.entry,
            index,
            end,
        }
    }

    pub fn as_raw_bytes(&self) -> &'b [u8] {
        self.entry.as_raw_bytes()
    }

    pub fn get(&self, i: usize) -> Option<Entry<'b, 'p>> {
        self.iter().nth(i)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        let (first, end) = self.entry.children();
        first == end
    }
}

impl<'b, 'p> IntoIterator for List<'b, 'p> {
    type Item = Entry<'b, 'p>;
    type IntoIter = ListIter<'b, 'p>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for List<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Iterator over the items of a [`List`], skipping nested tokens.
pub struct ListIter<'b, 'p> {
    entry: Entry<'b, 'p>,
    index: usize,
    end: usize,
}

impl<'b, 'p> Iterator for ListIter<'b, 'p> {
    type Item = Entry<'b, 'p>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.end {
            return None;
        }

        let (item, next) = self.entry.sibling(self.index);
        self.index = next;
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Error, List, Parser};

    #[test]
    fn items_skip_nested_values() {
        let mut parser = Parser::new();
        let list = parser.parse::<List>(b"ll7:udp://ael8:http://bee").unwrap();
        assert_eq!(2, list.len());

        let tiers: Vec<_> = list
            .iter()
            .map(|tier| tier.as_list().unwrap().get(0).unwrap().as_str().unwrap())
            .collect();
        assert_eq!(vec!["udp://a", "http://b"], tiers);
        assert!(list.get(2).is_none());
    }

    #[test]
    fn empty() {
        let mut parser = Parser::new();
        let list = parser.parse::<List>(b"le").unwrap();
        assert!(list.is_empty());
        assert_eq!(0, list.len());

        let list = parser.parse::<List>(b"llee").unwrap();
        assert!(!list.is_empty());
    }

    #[test]
    fn not_a_list() {
        let mut parser = Parser::new();
        assert_eq!(
            Error::TypeMismatch("Not a list"),
            parser.parse::<List>(b"i1e").unwrap_err()
        );
    }
}
