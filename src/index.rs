//! Groups posts into indices. The category index groups posts by the
//! directory they live in and is reported in lexicographic order; the tag
//! index groups posts by each of their tags and keeps the order in which
//! tags were first seen. Within a group, posts keep the order of the slice
//! the index was built from (newest first, once sorted).

use crate::entry::ContentItem;

/// A named group of posts.
#[derive(Debug)]
pub struct Group<'a> {
    /// The category or tag name.
    pub name: String,

    /// A URL-fragment-safe form of the name, e.g. for anchors on the
    /// categories page.
    pub slug: String,

    /// The posts belonging to the group.
    pub items: Vec<&'a ContentItem>,
}

/// An ordered collection of [`Group`]s with unique names.
#[derive(Debug, Default)]
pub struct Index<'a> {
    groups: Vec<Group<'a>>,
}

impl<'a> Index<'a> {
    /// Appends `item` to the group called `name`, creating the group at the
    /// end of the index if necessary.
    fn insert(&mut self, name: &str, item: &'a ContentItem) {
        match self.groups.iter_mut().find(|g| g.name == name) {
            Some(group) => group.items.push(item),
            None => self.groups.push(Group {
                name: name.to_owned(),
                slug: slug::slugify(name),
                items: vec![item],
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Group<'a>> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn groups(&self) -> &[Group<'a>] {
        &self.groups
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Builds the category index of `items`, with categories sorted
/// lexicographically.
pub fn categories(items: &[ContentItem]) -> Index<'_> {
    let mut index = Index::default();
    for item in items {
        index.insert(item.category(), item);
    }
    index.groups.sort_by(|a, b| a.name.cmp(&b.name));
    index
}

/// Builds the tag index of `items`. Posts without tags don't appear in it;
/// a post listing a tag twice appears once in that tag's group.
pub fn tags(items: &[ContentItem]) -> Index<'_> {
    let mut index = Index::default();
    for item in items {
        let mut seen: Vec<String> = Vec::new();
        for tag in item.tags() {
            if seen.contains(&tag) {
                continue;
            }
            index.insert(&tag, item);
            seen.push(tag);
        }
    }
    index
}
