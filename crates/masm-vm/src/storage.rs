//! Path resolution over storage values.

use masm_codegen::command::{Nbt, Segment};

/// A resolved path: either a stored value or one element of a byte array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slot<'a> {
    Value(&'a Nbt),
    Byte(i8),
}

impl Slot<'_> {
    pub fn to_nbt(self) -> Nbt {
        match self {
            Self::Value(v) => v.clone(),
            Self::Byte(b) => Nbt::Byte(b),
        }
    }

    /// What `data get` reports: the number itself, or the size of a
    /// container or string.
    pub fn measure(self) -> i32 {
        match self {
            Self::Byte(b) => i32::from(b),
            Self::Value(v) => match v {
                Nbt::Int(n) => *n,
                Nbt::Byte(b) => i32::from(*b),
                Nbt::String(s) => s.chars().count() as i32,
                Nbt::List(items) => items.len() as i32,
                Nbt::ByteArray(bytes) => bytes.len() as i32,
                Nbt::Compound(fields) => fields.len() as i32,
            },
        }
    }
}

/// Negative indices count from the end.
fn resolve(index: i32, len: usize) -> Option<usize> {
    let index = if index < 0 {
        len as i64 + i64::from(index)
    } else {
        i64::from(index)
    };
    usize::try_from(index).ok().filter(|&i| i < len)
}

fn child<'a>(node: &'a Nbt, segment: &Segment) -> Option<Slot<'a>> {
    match (node, segment) {
        (Nbt::Compound(fields), Segment::Key(key)) => fields.get(*key).map(Slot::Value),
        (Nbt::List(items), Segment::Index(i)) => {
            resolve(*i, items.len()).map(|i| Slot::Value(&items[i]))
        }
        (Nbt::ByteArray(bytes), Segment::Index(i)) => {
            resolve(*i, bytes.len()).map(|i| Slot::Byte(bytes[i]))
        }
        _ => None,
    }
}

fn child_mut<'a>(node: &'a mut Nbt, segment: &Segment) -> Option<&'a mut Nbt> {
    match (node, segment) {
        (Nbt::Compound(fields), Segment::Key(key)) => fields.get_mut(*key),
        (Nbt::List(items), Segment::Index(i)) => {
            let i = resolve(*i, items.len())?;
            items.get_mut(i)
        }
        _ => None,
    }
}

pub fn lookup<'a>(root: &'a Nbt, segments: &[Segment]) -> Option<Slot<'a>> {
    let Some((last, parents)) = segments.split_last() else {
        return Some(Slot::Value(root));
    };
    let mut node = root;
    for segment in parents {
        node = match child(node, segment)? {
            Slot::Value(v) => v,
            Slot::Byte(_) => return None,
        };
    }
    child(node, last)
}

pub fn lookup_mut<'a>(root: &'a mut Nbt, segments: &[Segment]) -> Option<&'a mut Nbt> {
    segments
        .iter()
        .try_fold(root, |node, segment| child_mut(node, segment))
}

/// Replace the value at `segments`, inserting a missing compound key.
/// Returns whether the stored value changed, or `None` when the path does
/// not resolve.
pub fn write(root: &mut Nbt, segments: &[Segment], value: Nbt) -> Option<bool> {
    let (last, parents) = segments.split_last()?;
    let parent = lookup_mut(root, parents)?;
    match (parent, last) {
        (Nbt::Compound(fields), Segment::Key(key)) => {
            let changed = fields.get(*key) != Some(&value);
            fields.insert((*key).to_string(), value);
            Some(changed)
        }
        (Nbt::List(items), Segment::Index(i)) => {
            let i = resolve(*i, items.len())?;
            let changed = items[i] != value;
            items[i] = value;
            Some(changed)
        }
        (Nbt::ByteArray(bytes), Segment::Index(i)) => {
            let i = resolve(*i, bytes.len())?;
            let byte = match value {
                Nbt::Byte(b) => b,
                Nbt::Int(n) => n as i8,
                _ => return None,
            };
            let changed = bytes[i] != byte;
            bytes[i] = byte;
            Some(changed)
        }
        _ => None,
    }
}

/// Remove the value at `segments`. `None` when nothing was there.
pub fn remove(root: &mut Nbt, segments: &[Segment]) -> Option<()> {
    let (last, parents) = segments.split_last()?;
    let parent = lookup_mut(root, parents)?;
    match (parent, last) {
        (Nbt::Compound(fields), Segment::Key(key)) => fields.remove(*key).map(|_| ()),
        (Nbt::List(items), Segment::Index(i)) => {
            let i = resolve(*i, items.len())?;
            items.remove(i);
            Some(())
        }
        (Nbt::ByteArray(bytes), Segment::Index(i)) => {
            let i = resolve(*i, bytes.len())?;
            bytes.remove(i);
            Some(())
        }
        _ => None,
    }
}

/// Append to a list or byte array.
pub fn append(target: &mut Nbt, value: Nbt) -> Option<()> {
    match (target, value) {
        (Nbt::List(items), value) => items.push(value),
        (Nbt::ByteArray(bytes), Nbt::Byte(b)) => bytes.push(b),
        (Nbt::ByteArray(bytes), Nbt::Int(n)) => bytes.push(n as i8),
        _ => return None,
    }
    Some(())
}
