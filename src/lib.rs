//! The library code for the `tessera` static site generator. A build is a
//! linear pipeline driven by [`build::build_site`]:
//!
//! 1. Discovering the source tree ([`source`]), which turns every Markdown
//!    file into a post ([`entry::ContentItem`]) and every other file into a
//!    verbatim copy, with the theme's static assets ([`theme`]) merged in
//! 2. Rendering each post's body ([`markdown`]) and then the post page
//!    through the theme's `post.html` template ([`value`] supplies the
//!    template bindings)
//! 3. Indexing the posts by category and by tag ([`index`])
//! 4. Rendering the two listing pages, `index.html` and `categories.html`
//!
//! Post metadata comes from YAML front matter ([`frontmatter`]), with
//! dates defaulted from version history ([`history`]) where available.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod config;
pub mod entry;
pub mod frontmatter;
pub mod history;
pub mod index;
pub mod markdown;
pub mod path;
pub mod source;
pub mod theme;
pub mod value;
