//! Converts the content model into template [`Value`]s.
//!
//! A post becomes an object with the fields `url`, `title`, `category`,
//! `tags`, `created`, `updated`, `date`, `content`, `summary`, `summarized`
//! and `meta` (every metadata entry). Indices become arrays of
//! `{name, slug, posts}` objects so templates iterate them in index order.

use crate::entry::ContentItem;
use crate::frontmatter::{MetaValue, Metadata, CREATED, DATE, UPDATED};
use crate::history::Commit;
use crate::index::{Group, Index};
use gtmpl::Value;
use std::collections::HashMap;

fn string(s: impl Into<String>) -> Value {
    Value::String(s.into())
}

fn object(fields: Vec<(&str, Value)>) -> Value {
    Value::Object(
        fields
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect::<HashMap<String, Value>>(),
    )
}

impl From<&MetaValue> for Value {
    fn from(v: &MetaValue) -> Value {
        match v {
            MetaValue::List(items) => Value::Array(items.iter().map(|i| string(i.as_str())).collect()),
            _ => string(v.as_text()),
        }
    }
}

impl From<&Metadata> for Value {
    fn from(m: &Metadata) -> Value {
        Value::Object(m.iter().map(|(k, v)| (k.to_owned(), v.into())).collect())
    }
}

impl From<&Commit> for Value {
    fn from(c: &Commit) -> Value {
        object(vec![
            ("id", string(c.id.as_str())),
            ("author", string(c.author.as_str())),
            ("email", string(c.email.as_str())),
            ("date", string(c.timestamp.format("%Y-%m-%d %H:%M:%S %z").to_string())),
            ("message", string(c.message.as_str())),
        ])
    }
}

fn optional(metadata: &Metadata, key: &str) -> Value {
    metadata.get(key).map(Value::from).unwrap_or(Value::Nil)
}

/// The template value of a post. `content` and `summary` are only filled in
/// once the post has been rendered.
pub fn item(item: &ContentItem) -> Value {
    let metadata = item.metadata();
    let (summary, summarized) = item.summary().unwrap_or(("", false));
    object(vec![
        ("url", string(item.url())),
        ("title", string(item.title())),
        ("category", string(item.category())),
        (
            "tags",
            Value::Array(item.tags().into_iter().map(string).collect()),
        ),
        ("created", optional(metadata, CREATED)),
        ("updated", optional(metadata, UPDATED)),
        ("date", optional(metadata, DATE)),
        ("content", string(item.rendered().unwrap_or_default())),
        ("summary", string(summary)),
        ("summarized", Value::Bool(summarized)),
        ("meta", metadata.into()),
    ])
}

/// The template value of a list of posts.
pub fn items<'a>(items: impl IntoIterator<Item = &'a ContentItem>) -> Value {
    Value::Array(items.into_iter().map(item).collect())
}

impl From<&Group<'_>> for Value {
    fn from(g: &Group) -> Value {
        object(vec![
            ("name", string(g.name.as_str())),
            ("slug", string(g.slug.as_str())),
            ("posts", items(g.items.iter().copied())),
        ])
    }
}

impl From<&Index<'_>> for Value {
    fn from(index: &Index) -> Value {
        Value::Array(index.groups().iter().map(Value::from).collect())
    }
}

/// The template value of a commit log.
pub fn commits(commits: &[Commit]) -> Value {
    Value::Array(commits.iter().map(Value::from).collect())
}

/// The bindings of a post's own page: the post itself under `post`, plus
/// `meta`, `content` and `category` as shortcuts and `rel_rootpath`, the
/// relative path from the page back to the site root.
pub fn post_page(post: &ContentItem) -> Value {
    object(vec![
        ("post", item(post)),
        ("meta", post.metadata().into()),
        ("content", string(post.rendered().unwrap_or_default())),
        ("category", string(post.category())),
        ("rel_rootpath", string(post.relative_root_prefix())),
    ])
}

/// The bindings of a listing page in the site root: every post in order, the
/// category and tag indices and, for the main page, the repository log.
pub fn listing_page(
    posts: &[ContentItem],
    categories: &Index,
    tags: &Index,
    log: Option<&[Commit]>,
) -> Value {
    let mut fields = vec![
        ("posts", items(posts)),
        ("categories", categories.into()),
        ("tags", tags.into()),
        ("rel_rootpath", string("./")),
    ];
    if let Some(log) = log {
        fields.push(("commits", commits(log)));
    }
    object(fields)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entry::SourceFile;
    use crate::frontmatter::{TAGS, TITLE};
    use crate::index;
    use std::path::Path;

    fn field<'v>(value: &'v Value, name: &str) -> &'v Value {
        match value {
            Value::Object(fields) => &fields[name],
            _ => panic!("wanted an object with field `{}`", name),
        }
    }

    fn text(value: &Value) -> &str {
        match value {
            Value::String(s) => s,
            _ => panic!("wanted a string"),
        }
    }

    fn array(value: &Value) -> &[Value] {
        match value {
            Value::Array(values) => values,
            _ => panic!("wanted an array"),
        }
    }

    fn post() -> ContentItem {
        let mut metadata = Metadata::new();
        metadata.insert(TITLE, MetaValue::Text("Hello".to_owned()));
        metadata.insert(
            TAGS,
            MetaValue::List(vec!["a".to_owned(), "b".to_owned()]),
        );
        let file = SourceFile::new(Path::new("/r/tech/hello.md"), Path::new("/r")).unwrap();
        ContentItem::new(file, metadata, "body".to_owned())
    }

    #[test]
    fn test_item() {
        let post = post();
        let value = item(&post);
        assert_eq!("tech/hello.html", text(field(&value, "url")));
        assert_eq!("Hello", text(field(&value, "title")));
        assert_eq!("tech", text(field(&value, "category")));
        assert_eq!("", text(field(&value, "content")));
        assert!(matches!(field(&value, "created"), Value::Nil));
        assert_eq!("Hello", text(field(field(&value, "meta"), "title")));
        let tags: Vec<&str> = array(field(field(&value, "meta"), "tags"))
            .iter()
            .map(text)
            .collect();
        assert_eq!(vec!["a", "b"], tags);
    }

    #[test]
    fn test_index() {
        let posts = vec![post()];
        let categories = index::categories(&posts);
        let value = Value::from(&categories);
        let groups = array(&value);
        assert_eq!(1, groups.len());
        assert_eq!("tech", text(field(&groups[0], "name")));
        assert_eq!(1, array(field(&groups[0], "posts")).len());
    }

    #[test]
    fn test_post_page() {
        let post = post();
        let value = post_page(&post);
        assert_eq!("../", text(field(&value, "rel_rootpath")));
        assert_eq!("tech", text(field(&value, "category")));
        assert_eq!("Hello", text(field(field(&value, "post"), "title")));
    }

    #[test]
    fn test_listing_page() {
        let posts = vec![post()];
        let categories = index::categories(&posts);
        let tags = index::tags(&posts);
        let log = vec![Commit {
            id: "abc".to_owned(),
            author: "Ada".to_owned(),
            email: "ada@example.org".to_owned(),
            timestamp: chrono::DateTime::parse_from_rfc3339("2024-01-02T03:04:05+01:00").unwrap(),
            message: "first".to_owned(),
        }];

        let main = listing_page(&posts, &categories, &tags, Some(log.as_slice()));
        assert_eq!("./", text(field(&main, "rel_rootpath")));
        assert_eq!(2, array(field(&main, "tags")).len());
        let commits = array(field(&main, "commits"));
        assert_eq!("2024-01-02 03:04:05 +0100", text(field(&commits[0], "date")));

        let listing = listing_page(&posts, &categories, &tags, None);
        match listing {
            Value::Object(fields) => assert!(!fields.contains_key("commits")),
            _ => panic!("wanted an object"),
        }
    }
}
