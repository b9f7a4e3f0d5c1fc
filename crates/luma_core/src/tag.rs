//! Type-tag algebra.
//!
//! A tag is one byte: bits 0-3 hold the primary kind, bits 4-5 the variant
//! of that kind and bit 6 marks heap-collectible references. The numeric
//! values appear in precompiled chunks and must not change.

use std::fmt;

pub const BIT_COLLECTABLE: u8 = 1 << 6;
const KIND_MASK: u8 = 0x0f;
const VARIANT_MASK: u8 = 0x30;

/// Primary kind of a value or heap object.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Nil = 0,
    Boolean = 1,
    LightUserdata = 2,
    Number = 3,
    String = 4,
    Table = 5,
    Function = 6,
    Userdata = 7,
    Thread = 8,
    /// Captured-variable cell. Never user-visible.
    Upvalue = 9,
    /// Compiled function template. Never user-visible.
    Proto = 10,
}

impl Kind {
    pub fn from_u8(k: u8) -> Option<Kind> {
        Some(match k {
            0 => Kind::Nil,
            1 => Kind::Boolean,
            2 => Kind::LightUserdata,
            3 => Kind::Number,
            4 => Kind::String,
            5 => Kind::Table,
            6 => Kind::Function,
            7 => Kind::Userdata,
            8 => Kind::Thread,
            9 => Kind::Upvalue,
            10 => Kind::Proto,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Kind::Nil => "nil",
            Kind::Boolean => "boolean",
            Kind::LightUserdata | Kind::Userdata => "userdata",
            Kind::Number => "number",
            Kind::String => "string",
            Kind::Table => "table",
            Kind::Function => "function",
            Kind::Thread => "thread",
            Kind::Upvalue => "upvalue",
            Kind::Proto => "proto",
        }
    }

    /// Whether values of this kind may appear in user-visible slots.
    pub fn is_internal(self) -> bool {
        matches!(self, Kind::Upvalue | Kind::Proto)
    }
}

const fn variant(kind: Kind, v: u8) -> u8 {
    (kind as u8) | (v << 4)
}

const fn ctb(t: u8) -> u8 {
    t | BIT_COLLECTABLE
}

#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(u8);

impl Tag {
    pub const NIL: Tag = Tag(variant(Kind::Nil, 0));
    /// Container slot with no entry.
    pub const EMPTY: Tag = Tag(variant(Kind::Nil, 1));
    /// Result of a failed lookup by key. Never stored.
    pub const ABSENT_KEY: Tag = Tag(variant(Kind::Nil, 2));

    pub const FALSE: Tag = Tag(variant(Kind::Boolean, 0));
    pub const TRUE: Tag = Tag(variant(Kind::Boolean, 1));

    pub const LIGHT_USERDATA: Tag = Tag(variant(Kind::LightUserdata, 0));
    pub const USERDATA: Tag = Tag(ctb(variant(Kind::Userdata, 0)));

    pub const INT: Tag = Tag(variant(Kind::Number, 0));
    pub const FLOAT: Tag = Tag(variant(Kind::Number, 1));

    pub const SHORT_STR: Tag = Tag(ctb(variant(Kind::String, 0)));
    pub const LONG_STR: Tag = Tag(ctb(variant(Kind::String, 1)));

    pub const TABLE: Tag = Tag(ctb(variant(Kind::Table, 0)));

    pub const SCRIPT_CLOSURE: Tag = Tag(ctb(variant(Kind::Function, 0)));
    pub const NATIVE_FN: Tag = Tag(variant(Kind::Function, 1));
    pub const NATIVE_CLOSURE: Tag = Tag(ctb(variant(Kind::Function, 2)));

    pub const THREAD: Tag = Tag(ctb(variant(Kind::Thread, 0)));
    pub const UPVALUE: Tag = Tag(ctb(variant(Kind::Upvalue, 0)));
    pub const PROTO: Tag = Tag(ctb(variant(Kind::Proto, 0)));

    const ALL: [Tag; 18] = [
        Tag::NIL,
        Tag::EMPTY,
        Tag::ABSENT_KEY,
        Tag::FALSE,
        Tag::TRUE,
        Tag::LIGHT_USERDATA,
        Tag::USERDATA,
        Tag::INT,
        Tag::FLOAT,
        Tag::SHORT_STR,
        Tag::LONG_STR,
        Tag::TABLE,
        Tag::SCRIPT_CLOSURE,
        Tag::NATIVE_FN,
        Tag::NATIVE_CLOSURE,
        Tag::THREAD,
        Tag::UPVALUE,
        Tag::PROTO,
    ];

    /// Rebuild a tag from its raw byte, rejecting bytes that name no
    /// known kind/variant combination.
    pub fn from_raw(raw: u8) -> Option<Tag> {
        Self::ALL.iter().copied().find(|t| t.0 == raw)
    }

    /// Rebuild a tag from its kind+variant byte (collectable bit cleared),
    /// as stored in precompiled chunks.
    pub fn from_type_tag(tt: u8) -> Option<Tag> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.type_tag() == tt)
    }

    #[inline(always)]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Kind and variant without the collectable bit.
    #[inline(always)]
    pub const fn type_tag(self) -> u8 {
        self.0 & (KIND_MASK | VARIANT_MASK)
    }

    #[inline(always)]
    pub const fn kind_bits(self) -> u8 {
        self.0 & KIND_MASK
    }

    #[inline(always)]
    pub fn kind(self) -> Kind {
        match Kind::from_u8(self.kind_bits()) {
            Some(k) => k,
            None => unreachable!("tag {:#04x} has no kind", self.0),
        }
    }

    #[inline(always)]
    pub const fn variant(self) -> u8 {
        (self.0 & VARIANT_MASK) >> 4
    }

    #[inline(always)]
    pub const fn is_collectable(self) -> bool {
        self.0 & BIT_COLLECTABLE != 0
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Tag::NIL => "nil",
            Tag::EMPTY => "empty",
            Tag::ABSENT_KEY => "absent-key",
            Tag::FALSE => "false",
            Tag::TRUE => "true",
            Tag::LIGHT_USERDATA => "light-userdata",
            Tag::USERDATA => "userdata",
            Tag::INT => "integer",
            Tag::FLOAT => "float",
            Tag::SHORT_STR => "short-string",
            Tag::LONG_STR => "long-string",
            Tag::TABLE => "table",
            Tag::SCRIPT_CLOSURE => "script-closure",
            Tag::NATIVE_FN => "native-function",
            Tag::NATIVE_CLOSURE => "native-closure",
            Tag::THREAD => "thread",
            Tag::UPVALUE => "upvalue",
            Tag::PROTO => "proto",
            _ => return write!(f, "Tag({:#04x})", self.0),
        };
        f.write_str(name)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
