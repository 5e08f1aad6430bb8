use crate::material::Material;

/// Index of a material inside a [`Materials`] collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialHandle(pub usize);

/// Container for the [`Material`] instances of a model.
///
/// Cells refer to materials by [`MaterialHandle`], so the collection can be
/// shared read-only by every worker during transport.
#[derive(Debug, Clone, Default)]
pub struct Materials {
    materials: Vec<Material>,
}

impl Materials {
    /// Create a new empty materials collection
    pub fn new() -> Self {
        Materials {
            materials: Vec::new(),
        }
    }

    /// Append a material and return its handle
    pub fn append(&mut self, material: Material) -> MaterialHandle {
        self.materials.push(material);
        MaterialHandle(self.materials.len() - 1)
    }

    pub fn get(&self, handle: MaterialHandle) -> Option<&Material> {
        self.materials.get(handle.0)
    }

    pub fn get_mut(&mut self, handle: MaterialHandle) -> Option<&mut Material> {
        self.materials.get_mut(handle.0)
    }

    /// Look a material up by name
    pub fn find(&self, name: &str) -> Option<MaterialHandle> {
        self.materials
            .iter()
            .position(|m| m.name == name)
            .map(MaterialHandle)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Material> {
        self.materials.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Material> {
        self.materials.iter_mut()
    }

    pub fn as_slice(&self) -> &[Material] {
        &self.materials
    }

    /// Release every ownership claim before a new majorant pass.
    pub fn reset_claims(&self) {
        for material in &self.materials {
            material.reset_claim();
        }
    }
}
