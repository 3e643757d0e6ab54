//! Shape descriptors
//!
//! Every object carries a `ShapeId` into the realm's `ShapeTable`. Each
//! builtin instance kind (arrays, data views, typed arrays, ...) owns one
//! canonical shape; objects whose layout diverges from the builtin one (for
//! example after a prototype swap) transition to a fresh shape. A shape also
//! carries a generation that is bumped when the builtin prototype of its kind
//! changes in a way compiled guards must notice.

use rustc_hash::FxHashMap as HashMap;
use serde::{Deserialize, Serialize};

/// Kind of object instance a shape describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceKind {
    Ordinary,
    Array,
    Arguments,
    Function,
    ArrayBuffer,
    TypedArray,
    DataView,
    Proxy,
}

impl InstanceKind {
    pub const ALL: [InstanceKind; 8] = [
        InstanceKind::Ordinary,
        InstanceKind::Array,
        InstanceKind::Arguments,
        InstanceKind::Function,
        InstanceKind::ArrayBuffer,
        InstanceKind::TypedArray,
        InstanceKind::DataView,
        InstanceKind::Proxy,
    ];
}

/// Index into the shape arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShapeId(u32);

impl ShapeId {
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct ShapeDescriptor {
    pub kind: InstanceKind,
    /// Canonical shape of builtin instances of `kind`
    pub builtin: bool,
    pub generation: u32,
}

/// Arena of shape descriptors
#[derive(Debug, Clone)]
pub struct ShapeTable {
    shapes: Vec<ShapeDescriptor>,
    builtin: HashMap<InstanceKind, ShapeId>,
}

impl ShapeTable {
    pub fn new() -> Self {
        let mut table = ShapeTable {
            shapes: Vec::new(),
            builtin: HashMap::default(),
        };
        for kind in InstanceKind::ALL {
            let id = table.alloc(kind, true);
            table.builtin.insert(kind, id);
        }
        table
    }

    fn alloc(&mut self, kind: InstanceKind, builtin: bool) -> ShapeId {
        let id = ShapeId(self.shapes.len() as u32);
        self.shapes.push(ShapeDescriptor {
            kind,
            builtin,
            generation: 1,
        });
        id
    }

    /// Canonical shape for builtin instances of `kind`
    pub fn builtin_shape(&self, kind: InstanceKind) -> ShapeId {
        // Every kind is registered in `new`.
        self.builtin.get(&kind).copied().unwrap_or(ShapeId(0))
    }

    /// A fresh, non-builtin shape for an object that leaves `from`
    pub fn transition(&mut self, from: ShapeId) -> ShapeId {
        let kind = self
            .descriptor(from)
            .map(|d| d.kind)
            .unwrap_or(InstanceKind::Ordinary);
        self.alloc(kind, false)
    }

    pub fn descriptor(&self, id: ShapeId) -> Option<&ShapeDescriptor> {
        self.shapes.get(id.0 as usize)
    }

    pub fn is_builtin(&self, id: ShapeId, kind: InstanceKind) -> bool {
        self.builtin_shape(kind) == id
    }

    /// Current generation of the builtin shape of `kind`
    pub fn generation(&self, kind: InstanceKind) -> u32 {
        self.descriptor(self.builtin_shape(kind))
            .map(|d| d.generation)
            .unwrap_or(0)
    }

    /// Invalidate every guard that captured the current generation of `kind`
    pub fn bump_generation(&mut self, kind: InstanceKind) {
        let id = self.builtin_shape(kind);
        if let Some(desc) = self.shapes.get_mut(id.0 as usize) {
            desc.generation += 1;
            tracing::debug!(?kind, generation = desc.generation, "builtin shape generation bumped");
        }
    }

    /// Generations of all builtin shapes, captured for a compilation request
    pub fn epochs(&self) -> ShapeEpochs {
        ShapeEpochs {
            generations: InstanceKind::ALL
                .iter()
                .map(|&k| (k, self.generation(k)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

impl Default for ShapeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe copy of builtin shape generations handed to compiler workers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShapeEpochs {
    generations: HashMap<InstanceKind, u32>,
}

impl ShapeEpochs {
    pub fn generation(&self, kind: InstanceKind) -> u32 {
        self.generations.get(&kind).copied().unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_shapes_registered() {
        let table = ShapeTable::new();
        let array = table.builtin_shape(InstanceKind::Array);
        assert!(table.is_builtin(array, InstanceKind::Array));
        assert!(!table.is_builtin(array, InstanceKind::DataView));
        assert_eq!(table.len(), InstanceKind::ALL.len());
    }

    #[test]
    fn test_transition_keeps_kind() {
        let mut table = ShapeTable::new();
        let array = table.builtin_shape(InstanceKind::Array);
        let moved = table.transition(array);
        assert_ne!(moved, array);
        assert_eq!(table.descriptor(moved).unwrap().kind, InstanceKind::Array);
        assert!(!table.is_builtin(moved, InstanceKind::Array));
    }

    #[test]
    fn test_generation_bump_visible_in_epochs() {
        let mut table = ShapeTable::new();
        let before = table.epochs();
        table.bump_generation(InstanceKind::Array);
        let after = table.epochs();
        assert_eq!(after.generation(InstanceKind::Array), before.generation(InstanceKind::Array) + 1);
        assert_eq!(after.generation(InstanceKind::DataView), before.generation(InstanceKind::DataView));
    }
}
