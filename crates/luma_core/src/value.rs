//! Runtime value representation.
//!
//! A value is a (payload, tag) pair. Both halves are private and only ever
//! written together by the constructors below, so a torn pair cannot be
//! observed. Payload accessors check the tag first; a mismatch is an
//! internal-consistency failure and panics.

use crate::gc::ObjectId;
use crate::tag::{Kind, Tag};
use std::fmt;

/// Index of a native callable in the runtime's native registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeId(pub u32);

#[derive(Clone, Copy)]
pub struct Value {
    bits: u64,
    tag: Tag,
}

impl Default for Value {
    fn default() -> Self {
        Self::NIL
    }
}

#[cold]
#[track_caller]
fn tag_mismatch(expected: &str, found: Tag) -> ! {
    panic!("internal consistency violation: expected {expected}, found {found}")
}

impl Value {
    pub const NIL: Value = Value { bits: 0, tag: Tag::NIL };
    pub const EMPTY: Value = Value { bits: 0, tag: Tag::EMPTY };
    pub const ABSENT_KEY: Value = Value { bits: 0, tag: Tag::ABSENT_KEY };
    pub const FALSE: Value = Value { bits: 0, tag: Tag::FALSE };
    pub const TRUE: Value = Value { bits: 0, tag: Tag::TRUE };

    #[inline(always)]
    pub fn boolean(b: bool) -> Self {
        if b { Self::TRUE } else { Self::FALSE }
    }

    #[inline(always)]
    pub fn integer(i: i64) -> Self {
        Self { bits: i as u64, tag: Tag::INT }
    }

    #[inline(always)]
    pub fn float(f: f64) -> Self {
        Self { bits: f.to_bits(), tag: Tag::FLOAT }
    }

    #[inline(always)]
    pub fn light_userdata(p: usize) -> Self {
        Self { bits: p as u64, tag: Tag::LIGHT_USERDATA }
    }

    #[inline(always)]
    pub fn native_fn(id: NativeId) -> Self {
        Self { bits: id.0 as u64, tag: Tag::NATIVE_FN }
    }

    /// Reference to a heap object. `tag` must be a collectable tag and must
    /// equal the tag stored in the object's header.
    #[inline(always)]
    #[track_caller]
    pub fn from_object(tag: Tag, id: ObjectId) -> Self {
        if !tag.is_collectable() {
            tag_mismatch("a collectable tag", tag);
        }
        Self { bits: id.0 as u64, tag }
    }

    pub fn short_string(id: ObjectId) -> Self {
        Self::from_object(Tag::SHORT_STR, id)
    }
    pub fn long_string(id: ObjectId) -> Self {
        Self::from_object(Tag::LONG_STR, id)
    }
    pub fn script_closure(id: ObjectId) -> Self {
        Self::from_object(Tag::SCRIPT_CLOSURE, id)
    }
    pub fn native_closure(id: ObjectId) -> Self {
        Self::from_object(Tag::NATIVE_CLOSURE, id)
    }
    pub fn userdata(id: ObjectId) -> Self {
        Self::from_object(Tag::USERDATA, id)
    }

    // ---- tag predicates ----

    #[inline(always)]
    pub fn tag(&self) -> Tag {
        self.tag
    }

    #[inline(always)]
    pub fn kind(&self) -> Kind {
        self.tag.kind()
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    /// Any nil variant (nil, empty slot, absent key).
    #[inline(always)]
    pub fn is_nil(&self) -> bool {
        self.tag.kind_bits() == Kind::Nil as u8
    }

    /// Standard nil only.
    #[inline(always)]
    pub fn is_strict_nil(&self) -> bool {
        self.tag == Tag::NIL
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.tag == Tag::EMPTY
    }

    #[inline(always)]
    pub fn is_absent_key(&self) -> bool {
        self.tag == Tag::ABSENT_KEY
    }

    #[inline(always)]
    pub fn is_boolean(&self) -> bool {
        self.tag.kind_bits() == Kind::Boolean as u8
    }

    #[inline(always)]
    pub fn is_false(&self) -> bool {
        self.tag == Tag::FALSE
    }

    /// `false` or any nil.
    #[inline(always)]
    pub fn is_falsy(&self) -> bool {
        self.is_false() || self.is_nil()
    }

    #[inline(always)]
    pub fn is_number(&self) -> bool {
        self.tag.kind_bits() == Kind::Number as u8
    }

    #[inline(always)]
    pub fn is_integer(&self) -> bool {
        self.tag == Tag::INT
    }

    #[inline(always)]
    pub fn is_float(&self) -> bool {
        self.tag == Tag::FLOAT
    }

    #[inline(always)]
    pub fn is_string(&self) -> bool {
        self.tag.kind_bits() == Kind::String as u8
    }

    #[inline(always)]
    pub fn is_short_string(&self) -> bool {
        self.tag == Tag::SHORT_STR
    }

    #[inline(always)]
    pub fn is_long_string(&self) -> bool {
        self.tag == Tag::LONG_STR
    }

    #[inline(always)]
    pub fn is_function(&self) -> bool {
        self.tag.kind_bits() == Kind::Function as u8
    }

    #[inline(always)]
    pub fn is_script_closure(&self) -> bool {
        self.tag == Tag::SCRIPT_CLOSURE
    }

    #[inline(always)]
    pub fn is_native_fn(&self) -> bool {
        self.tag == Tag::NATIVE_FN
    }

    #[inline(always)]
    pub fn is_native_closure(&self) -> bool {
        self.tag == Tag::NATIVE_CLOSURE
    }

    #[inline(always)]
    pub fn is_userdata(&self) -> bool {
        self.tag == Tag::USERDATA
    }

    #[inline(always)]
    pub fn is_light_userdata(&self) -> bool {
        self.tag == Tag::LIGHT_USERDATA
    }

    #[inline(always)]
    pub fn is_collectable(&self) -> bool {
        self.tag.is_collectable()
    }

    // ---- guarded payload access ----

    #[inline]
    pub fn try_integer(&self) -> Option<i64> {
        self.is_integer().then_some(self.bits as i64)
    }

    #[inline]
    pub fn try_float(&self) -> Option<f64> {
        self.is_float().then(|| f64::from_bits(self.bits))
    }

    #[inline]
    pub fn try_object(&self) -> Option<ObjectId> {
        self.is_collectable().then_some(ObjectId(self.bits as usize))
    }

    #[inline]
    #[track_caller]
    pub fn as_integer(&self) -> i64 {
        match self.try_integer() {
            Some(i) => i,
            None => tag_mismatch("integer", self.tag),
        }
    }

    #[inline]
    #[track_caller]
    pub fn as_float(&self) -> f64 {
        match self.try_float() {
            Some(f) => f,
            None => tag_mismatch("float", self.tag),
        }
    }

    #[inline]
    #[track_caller]
    pub fn as_boolean(&self) -> bool {
        match self.tag {
            Tag::TRUE => true,
            Tag::FALSE => false,
            other => tag_mismatch("boolean", other),
        }
    }

    #[inline]
    #[track_caller]
    pub fn as_light_userdata(&self) -> usize {
        if !self.is_light_userdata() {
            tag_mismatch("light userdata", self.tag);
        }
        self.bits as usize
    }

    #[inline]
    #[track_caller]
    pub fn as_native_fn(&self) -> NativeId {
        if !self.is_native_fn() {
            tag_mismatch("native function", self.tag);
        }
        NativeId(self.bits as u32)
    }

    #[inline]
    #[track_caller]
    pub fn as_object(&self) -> ObjectId {
        match self.try_object() {
            Some(id) => id,
            None => tag_mismatch("a heap reference", self.tag),
        }
    }

    /// Object reference checked against an exact tag.
    #[inline]
    #[track_caller]
    pub fn expect_object(&self, tag: Tag) -> ObjectId {
        if self.tag != tag {
            tag_mismatch(&format!("{tag}"), self.tag);
        }
        ObjectId(self.bits as usize)
    }
}

/// Identity: same tag and same payload bits.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag && self.bits == other.bits
    }
}

impl Eq for Value {}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            Tag::NIL => write!(f, "Nil"),
            Tag::EMPTY => write!(f, "Empty"),
            Tag::ABSENT_KEY => write!(f, "AbsentKey"),
            Tag::TRUE => write!(f, "Bool(true)"),
            Tag::FALSE => write!(f, "Bool(false)"),
            Tag::INT => write!(f, "Int({})", self.bits as i64),
            Tag::FLOAT => write!(f, "Float({})", f64::from_bits(self.bits)),
            Tag::LIGHT_USERDATA => write!(f, "LightUserdata({:#x})", self.bits),
            Tag::NATIVE_FN => write!(f, "NativeFn({})", self.bits),
            tag => write!(f, "{tag}({})", ObjectId(self.bits as usize)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_variants_are_all_nil() {
        for v in [Value::NIL, Value::EMPTY, Value::ABSENT_KEY] {
            assert!(v.is_nil());
            assert!(v.is_falsy());
        }
        assert!(Value::NIL.is_strict_nil());
        assert!(!Value::EMPTY.is_strict_nil());
        assert_ne!(Value::EMPTY, Value::NIL);
    }

    #[test]
    fn numbers_keep_their_variant() {
        let i = Value::integer(-7);
        let f = Value::float(-7.0);
        assert!(i.is_number() && f.is_number());
        assert_eq!(i.as_integer(), -7);
        assert_eq!(f.as_float(), -7.0);
        assert_eq!(i.try_float(), None);
        assert_ne!(i, f);
    }

    #[test]
    fn objects_carry_collectable_tags() {
        let v = Value::short_string(ObjectId(3));
        assert!(v.is_collectable());
        assert_eq!(v.as_object(), ObjectId(3));
        assert_eq!(v.expect_object(Tag::SHORT_STR), ObjectId(3));
        assert!(!Value::native_fn(NativeId(1)).is_collectable());
    }

    #[test]
    #[should_panic(expected = "internal consistency violation")]
    fn wrong_payload_access_is_fatal() {
        Value::float(1.5).as_integer();
    }

    #[test]
    #[should_panic(expected = "expected a collectable tag")]
    fn non_collectable_object_tag_is_fatal() {
        Value::from_object(Tag::INT, ObjectId(0));
    }

    #[test]
    fn falsy_is_only_false_and_nil() {
        assert!(Value::FALSE.is_falsy());
        assert!(!Value::TRUE.is_falsy());
        assert!(!Value::integer(0).is_falsy());
    }
}
