//! Resource categories, load masks, and the block/file kind tags.
//!
//! The category enumeration does double duty in the file format: each shape
//! node and resource block carries exactly one category as a discrete tag,
//! while load filtering combines categories into a bitmask. To keep the two
//! uses from being confused, the discrete tag is the closed [`Category`]
//! enum and the combinable form is the separate [`CategoryMask`] bitset with
//! an explicit conversion between them.

use std::fmt;
use std::ops::BitOr;

/// Discrete tag identifying what kind of resource or node a record
/// represents.
///
/// Each variant's value is a single bit so it can be lifted into a
/// [`CategoryMask`] without translation; the raw values are part of the
/// file format and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum Category {
    /// A scene object grouping components under a name.
    Object = 1,
    /// The single root of the shape tree.
    Root = 1 << 1,
    /// The node block itself (used for index bookkeeping, never as a
    /// resource record category).
    Node = 1 << 2,
    /// The index block (bookkeeping tag, like `Node`).
    Index = 1 << 3,
    /// An attached script or behaviour.
    Script = 1 << 4,
    /// Static mesh payload.
    Mesh = 1 << 5,
    /// Skinned mesh payload.
    SkinnedMesh = 1 << 6,
    /// Spatial transform.
    Transform = 1 << 7,
    /// Animation payload.
    Animation = 1 << 8,
    /// Material payload.
    Material = 1 << 9,
    /// Texture payload.
    Texture = 1 << 10,
    /// Audio payload.
    Audio = 1 << 11,
    /// A single primitive field value (int, float, string, byte buffer).
    Primitive = 1 << 12,
    /// A collection wrapping N element children.
    Collection = 1 << 13,
    /// A collection whose elements are references to nodes elsewhere in
    /// the tree, resolved after the full tree is built.
    PointerCollection = 1 << 14,
    /// A schema-described class instance.
    Class = 1 << 15,
    /// A record whose payload is just another record's reference ID, used
    /// for deduplication and forward references.
    Pointer = 1 << 16,
}

impl Category {
    const ALL_VARIANTS: [Category; 17] = [
        Category::Object,
        Category::Root,
        Category::Node,
        Category::Index,
        Category::Script,
        Category::Mesh,
        Category::SkinnedMesh,
        Category::Transform,
        Category::Animation,
        Category::Material,
        Category::Texture,
        Category::Audio,
        Category::Primitive,
        Category::Collection,
        Category::PointerCollection,
        Category::Class,
        Category::Pointer,
    ];

    /// The single-bit raw value stored in the file.
    pub const fn bit(self) -> u32 {
        self as u32
    }

    /// Decodes a raw tag value. Returns `None` for values that are not a
    /// known single category.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL_VARIANTS.iter().copied().find(|c| c.bit() == raw)
    }

    /// Whether this category's node names are read during decode.
    ///
    /// Only object- and transform-like nodes are ever looked up by name,
    /// so only their name bytes are materialized; every other category's
    /// name is seeked past and replaced with a placeholder. Changing this
    /// set changes file compatibility.
    pub fn reads_name(self) -> bool {
        matches!(self, Category::Object | Category::Transform)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<Category> for CategoryMask {
    fn from(category: Category) -> Self {
        CategoryMask(category.bit())
    }
}

/// A combinable bitset of categories used to select which resource blocks
/// the reader parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryMask(u32);

impl CategoryMask {
    /// Matches nothing.
    pub const NONE: CategoryMask = CategoryMask(0);

    /// Matches every category.
    pub const ALL: CategoryMask = CategoryMask(u32::MAX);

    /// The categories needed to reconstruct schema-described data without
    /// touching heavy asset payloads.
    pub const METADATA: CategoryMask = CategoryMask(
        Category::Root.bit()
            | Category::Object.bit()
            | Category::Script.bit()
            | Category::Class.bit()
            | Category::Primitive.bit()
            | Category::Collection.bit()
            | Category::PointerCollection.bit()
            | Category::Pointer.bit(),
    );

    /// Builds a mask from a raw bit pattern.
    pub fn from_bits(bits: u32) -> Self {
        CategoryMask(bits)
    }

    /// The raw bit pattern.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether the mask selects `category`.
    pub fn contains(self, category: Category) -> bool {
        self.0 & category.bit() != 0
    }

    /// Returns this mask with `category` added.
    pub fn with(self, category: Category) -> Self {
        CategoryMask(self.0 | category.bit())
    }

    /// Returns this mask with `category` removed.
    pub fn without(self, category: Category) -> Self {
        CategoryMask(self.0 & !category.bit())
    }
}

impl BitOr for CategoryMask {
    type Output = CategoryMask;

    fn bitor(self, rhs: Self) -> Self {
        CategoryMask(self.0 | rhs.0)
    }
}

impl BitOr<Category> for CategoryMask {
    type Output = CategoryMask;

    fn bitor(self, rhs: Category) -> Self {
        self.with(rhs)
    }
}

/// Tag identifying how a block's body is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BlockKind {
    /// A resource block holding records for one category.
    Resource = 0,
    /// The index of (category, offset) pairs.
    Index = 1,
    /// The node shape tree.
    Node = 2,
}

impl BlockKind {
    /// Decodes a raw block kind. Unknown values return `None`; the reader
    /// skips such blocks instead of failing the whole file.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(BlockKind::Resource),
            1 => Some(BlockKind::Index),
            2 => Some(BlockKind::Node),
            _ => None,
        }
    }
}

/// File kind recorded in the header; opaque to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum FileKind {
    /// No declared kind.
    #[default]
    Unknown = 0,
    /// A playable scene or prefab-like asset.
    GameAsset = 1,
    /// Audio-only container.
    SoundAsset = 2,
    /// Texture-only container.
    TextureAsset = 3,
    /// Animation-only container.
    AnimationAsset = 4,
    /// Pure metadata, no heavy payloads.
    MetaData = 5,
}

impl FileKind {
    /// Decodes a raw header value, mapping unrecognized kinds to
    /// `Unknown`.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => FileKind::GameAsset,
            2 => FileKind::SoundAsset,
            3 => FileKind::TextureAsset,
            4 => FileKind::AnimationAsset,
            5 => FileKind::MetaData,
            _ => FileKind::Unknown,
        }
    }
}

/// How a resource record's metadata bytes are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum MetadataKind {
    /// No metadata.
    #[default]
    None = 0,
    /// UTF-8 JSON text.
    Json = 1,
    /// Opaque binary supplied by a domain collaborator.
    Binary = 2,
    /// A bincode-encoded field or collection descriptor produced by the
    /// graph codec.
    SchemaEncoded = 3,
}

impl MetadataKind {
    /// Decodes a raw metadata kind, mapping unrecognized values to `None`.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => MetadataKind::Json,
            2 => MetadataKind::Binary,
            3 => MetadataKind::SchemaEncoded,
            _ => MetadataKind::None,
        }
    }
}
