// assets.rs — engine asset services used during save and restore
//
// Model and material index fields persist the asset *name*, not the index,
// because index assignment is per-level. The save side turns an index into a
// name; the restore side precaches the name and turns it back into whatever
// index the new level hands out.

/// Name/index translation and precaching for engine assets.
pub trait AssetServices {
    /// Name of the model at `index`, or empty if unknown.
    fn model_name(&self, index: i32) -> String;
    /// Index of a model by name, -1 if not loaded.
    fn model_index(&self, name: &str) -> i32;
    fn precache_model(&mut self, name: &str);

    fn material_name(&self, index: i32) -> String;
    fn material_index(&self, name: &str) -> i32;
    fn precache_material(&mut self, name: &str);

    fn precache_sound(&mut self, name: &str);
}

/// Asset services that know nothing. Index fields save as empty names and
/// restore as -1.
#[derive(Default)]
pub struct NullAssets;

impl AssetServices for NullAssets {
    fn model_name(&self, _index: i32) -> String {
        String::new()
    }
    fn model_index(&self, _name: &str) -> i32 {
        -1
    }
    fn precache_model(&mut self, _name: &str) {}

    fn material_name(&self, _index: i32) -> String {
        String::new()
    }
    fn material_index(&self, _name: &str) -> i32 {
        -1
    }
    fn precache_material(&mut self, _name: &str) {}

    fn precache_sound(&mut self, _name: &str) {}
}

/// Table-backed asset services. Indices are assigned in registration order,
/// starting at 1 like the engine's precache lists.
#[derive(Default)]
pub struct TableAssets {
    models: Vec<String>,
    materials: Vec<String>,
    pub precached_models: Vec<String>,
    pub precached_sounds: Vec<String>,
}

impl TableAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_model(&mut self, name: &str) -> i32 {
        if let Some(pos) = self.models.iter().position(|m| m == name) {
            return pos as i32 + 1;
        }
        self.models.push(name.to_string());
        self.models.len() as i32
    }

    pub fn register_material(&mut self, name: &str) -> i32 {
        if let Some(pos) = self.materials.iter().position(|m| m == name) {
            return pos as i32 + 1;
        }
        self.materials.push(name.to_string());
        self.materials.len() as i32
    }
}

impl AssetServices for TableAssets {
    fn model_name(&self, index: i32) -> String {
        if index < 1 {
            return String::new();
        }
        self.models
            .get(index as usize - 1)
            .cloned()
            .unwrap_or_default()
    }

    fn model_index(&self, name: &str) -> i32 {
        match self.models.iter().position(|m| m == name) {
            Some(pos) => pos as i32 + 1,
            None => -1,
        }
    }

    fn precache_model(&mut self, name: &str) {
        self.register_model(name);
        self.precached_models.push(name.to_string());
    }

    fn material_name(&self, index: i32) -> String {
        if index < 1 {
            return String::new();
        }
        self.materials
            .get(index as usize - 1)
            .cloned()
            .unwrap_or_default()
    }

    fn material_index(&self, name: &str) -> i32 {
        match self.materials.iter().position(|m| m == name) {
            Some(pos) => pos as i32 + 1,
            None => -1,
        }
    }

    fn precache_material(&mut self, name: &str) {
        self.register_material(name);
    }

    fn precache_sound(&mut self, name: &str) {
        self.precached_sounds.push(name.to_string());
    }
}
