//! Identifier assignment: stable IDs and URL-safe slugs.
//!
//! Every category, lesson, and item gets an [`Assigned`] `(id, slug)` pair.
//!
//! ## IDs
//!
//! An ID is the first 16 hex characters of a SHA-256 over the node kind, the
//! parent's ID, and the node's identity key (explicit `key`, else the title or
//! prompt). Position is deliberately not hashed, so adding, removing or
//! reordering siblings never changes an existing node's ID. Ancestry is
//! hashed, so moving a lesson to another category gives it a new ID.
//!
//! In the (theoretical) event of two nodes producing the same candidate, the
//! later one in document order takes `<candidate>-<index>`.
//!
//! ## Slugs
//!
//! [`slugify`] is total: any string, in any script, yields a non-empty
//! `[a-z0-9-]` slug or `None` (after which the caller uses `<kind>-<index>`).
//! Collisions get `-2`, `-3`, ... in document order.

use crate::spec::{CourseMeta, CourseSpec, MediaRef};
use crate::types::ItemKind;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::PathBuf;

/// Slugs longer than this are cut back to the last dash before the limit.
const MAX_SLUG_LEN: usize = 80;

/// Hex characters kept from the SHA-256 for entity IDs.
const ID_LEN: usize = 16;

/// Hex characters kept for content-derived image names.
const IMAGE_HASH_LEN: usize = 12;

/// Lessons carry at least this many thumbnails whenever they have any image;
/// item images fill in when a lesson declares none.
const THUMBNAIL_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Category,
    Lesson,
    Item,
}

impl NodeKind {
    fn tag(self) -> &'static str {
        match self {
            NodeKind::Category => "category",
            NodeKind::Lesson => "lesson",
            NodeKind::Item => "item",
        }
    }
}

/// The `(id, slug)` pair bound to a node, plus its position among siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assigned {
    pub id: String,
    pub slug: String,
    pub order: usize,
}

/// A source image and the name its variants are written under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    pub name: String,
    pub source: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCourse {
    pub meta: CourseMeta,
    pub categories: Vec<CompiledCategory>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCategory {
    pub assigned: Assigned,
    pub title: String,
    pub intro: Option<String>,
    pub lessons: Vec<CompiledLesson>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledLesson {
    pub assigned: Assigned,
    pub title: String,
    pub intro: Option<String>,
    pub thumbnails: Vec<ImageAsset>,
    pub items: Vec<CompiledItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledItem {
    pub assigned: Assigned,
    pub kind: ItemKind,
    pub prompt: String,
    pub answer: String,
    pub alternatives: Vec<String>,
    pub image: Option<ImageAsset>,
}

impl CompiledCourse {
    /// Every distinct image the course references, in document order.
    pub fn images(&self) -> Vec<&ImageAsset> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for lesson in self.categories.iter().flat_map(|c| &c.lessons) {
            let item_images = lesson.items.iter().filter_map(|i| i.image.as_ref());
            for asset in lesson.thumbnails.iter().chain(item_images) {
                if seen.insert(asset.name.as_str()) {
                    out.push(asset);
                }
            }
        }
        out
    }

    pub fn lesson_count(&self) -> usize {
        self.categories.iter().map(|c| c.lessons.len()).sum()
    }

    pub fn item_count(&self) -> usize {
        self.categories
            .iter()
            .flat_map(|c| &c.lessons)
            .map(|l| l.items.len())
            .sum()
    }
}

/// Turn an arbitrary title into a URL-safe slug.
///
/// Non-ASCII text is transliterated first, so `"こんにちは"` and `"Café"`
/// both produce readable ASCII. Returns `None` when nothing survives.
pub fn slugify(title: &str) -> Option<String> {
    let ascii = deunicode::deunicode(title).to_lowercase();

    let mut collapsed = String::with_capacity(ascii.len());
    let mut prev_dash = false;
    for c in ascii.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            collapsed.push(c);
            prev_dash = false;
        } else if !prev_dash {
            collapsed.push('-');
            prev_dash = true;
        }
    }

    let trimmed = collapsed.trim_matches('-');
    let slug = if trimmed.len() <= MAX_SLUG_LEN {
        trimmed
    } else {
        let truncated = &trimmed[..MAX_SLUG_LEN];
        match truncated.rfind('-') {
            Some(pos) => &truncated[..pos],
            None => truncated,
        }
    };

    if slug.is_empty() {
        None
    } else {
        Some(slug.to_string())
    }
}

/// Candidate ID for a node: kind, parent ID and identity key, hashed.
pub fn node_id(kind: NodeKind, parent: Option<&str>, identity: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.tag().as_bytes());
    hasher.update(b"\0");
    hasher.update(parent.unwrap_or("").as_bytes());
    hasher.update(b"\0");
    hasher.update(identity.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..ID_LEN].to_string()
}

/// Output name for an image: the explicit `image_id`, or a hash of the
/// reference as written.
pub fn image_name(course_slug: &str, media: &MediaRef) -> String {
    match &media.image_id {
        Some(id) => format!("{course_slug}_{id}"),
        None => {
            let digest = Sha256::digest(format!("{course_slug}|{}", media.reference).as_bytes());
            let hex = format!("{digest:x}");
            format!("{course_slug}_{}", &hex[..IMAGE_HASH_LEN])
        }
    }
}

/// Repeat the first thumbnail until there are [`THUMBNAIL_COUNT`].
fn pad_thumbnails(mut thumbnails: Vec<ImageAsset>) -> Vec<ImageAsset> {
    if let Some(first) = thumbnails.first().cloned() {
        thumbnails.resize(thumbnails.len().max(THUMBNAIL_COUNT), first);
    }
    thumbnails
}

fn item_kind(prompt: &str) -> ItemKind {
    if prompt.chars().any(char::is_whitespace) {
        ItemKind::Phrase
    } else {
        ItemKind::Word
    }
}

/// Hands out unique values within one namespace.
#[derive(Default)]
struct Namespace {
    used: HashSet<String>,
}

impl Namespace {
    /// Claim `base`, or the first free `base-2`, `base-3`, ...
    fn claim_slug(&mut self, base: String) -> String {
        if self.used.insert(base.clone()) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}-{n}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Claim an ID, falling back to `<candidate>-<index>` on collision.
    fn claim_id(&mut self, candidate: String, index: usize) -> String {
        if self.used.insert(candidate.clone()) {
            return candidate;
        }
        self.claim_slug(format!("{candidate}-{index}"))
    }
}

/// Walks the validated tree in document order, handing out IDs and slugs.
struct Assigner {
    ids: Namespace,
    category_slugs: Namespace,
    lesson_slugs: Namespace,
    /// Document-order counters per kind, used for fallbacks.
    counters: [usize; 3],
}

impl Assigner {
    fn new() -> Self {
        Self {
            ids: Namespace::default(),
            category_slugs: Namespace::default(),
            lesson_slugs: Namespace::default(),
            counters: [0; 3],
        }
    }

    fn next_index(&mut self, kind: NodeKind) -> usize {
        let slot = &mut self.counters[kind as usize];
        let index = *slot;
        *slot += 1;
        index
    }

    fn assign(&mut self, node: Node<'_>, item_slugs: Option<&mut Namespace>) -> Assigned {
        let index = self.next_index(node.kind);
        let id = self
            .ids
            .claim_id(node_id(node.kind, node.parent, node.identity), index);

        let base = node
            .slug
            .map(str::to_string)
            .or_else(|| slugify(node.title))
            .unwrap_or_else(|| format!("{}-{index}", node.kind.tag()));
        let slug = match (node.kind, item_slugs) {
            (NodeKind::Category, _) => self.category_slugs.claim_slug(base),
            (NodeKind::Lesson, _) => self.lesson_slugs.claim_slug(base),
            (NodeKind::Item, Some(ns)) => ns.claim_slug(base),
            (NodeKind::Item, None) => base,
        };

        Assigned {
            id,
            slug,
            order: node.order,
        }
    }
}

/// What the assigner needs to know about one node.
struct Node<'a> {
    kind: NodeKind,
    parent: Option<&'a str>,
    identity: &'a str,
    slug: Option<&'a str>,
    title: &'a str,
    order: usize,
}

/// Assign identifiers to every node of a validated specification.
///
/// Pure and total: the same specification always yields the same result.
pub fn assign(spec: CourseSpec) -> CompiledCourse {
    let course_slug = spec.meta.slug.clone();
    let asset = |media: &MediaRef| ImageAsset {
        name: image_name(&course_slug, media),
        source: media.source.clone(),
    };

    let mut assigner = Assigner::new();
    let mut categories = Vec::with_capacity(spec.categories.len());

    for (ci, cat) in spec.categories.into_iter().enumerate() {
        let cat_assigned = assigner.assign(
            Node {
                kind: NodeKind::Category,
                parent: None,
                identity: cat.identity(),
                slug: cat.slug.as_deref(),
                title: &cat.title,
                order: ci,
            },
            None,
        );

        let mut lessons = Vec::with_capacity(cat.lessons.len());
        for (li, lesson) in cat.lessons.into_iter().enumerate() {
            let lesson_assigned = assigner.assign(
                Node {
                    kind: NodeKind::Lesson,
                    parent: Some(&cat_assigned.id),
                    identity: lesson.identity(),
                    slug: lesson.slug.as_deref(),
                    title: &lesson.title,
                    order: li,
                },
                None,
            );

            let mut item_slugs = Namespace::default();
            let items: Vec<CompiledItem> = lesson
                .items
                .iter()
                .enumerate()
                .map(|(ii, item)| CompiledItem {
                    assigned: assigner.assign(
                        Node {
                            kind: NodeKind::Item,
                            parent: Some(&lesson_assigned.id),
                            identity: item.identity(),
                            slug: None,
                            title: &item.prompt,
                            order: ii,
                        },
                        Some(&mut item_slugs),
                    ),
                    kind: item_kind(&item.prompt),
                    prompt: item.prompt.clone(),
                    answer: item.answer.clone(),
                    alternatives: item.alternatives.clone(),
                    image: item.image.as_ref().map(asset),
                })
                .collect();

            let thumbnails = pad_thumbnails(if lesson.images.is_empty() {
                let mut seen = HashSet::new();
                items
                    .iter()
                    .filter_map(|i| i.image.clone())
                    .filter(|a| seen.insert(a.name.clone()))
                    .take(THUMBNAIL_COUNT)
                    .collect()
            } else {
                lesson.images.iter().map(asset).collect()
            });

            lessons.push(CompiledLesson {
                assigned: lesson_assigned,
                title: lesson.title,
                intro: lesson.intro,
                thumbnails,
                items,
            });
        }

        categories.push(CompiledCategory {
            assigned: cat_assigned,
            title: cat.title,
            intro: cat.intro,
            lessons,
        });
    }

    CompiledCourse {
        meta: spec.meta,
        categories,
    }
}
