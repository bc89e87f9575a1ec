//! Visualization catalog tables.
//!
//! Two tables back module resolution: the type table maps a visualization
//! type string to a catalog module path, and the importer table maps a
//! module path to the import function producing that module's exports. A
//! type with no path entry and a path with no importer entry are distinct
//! misconfigurations, reported separately. The built-in catalog covers the
//! shipped visualizations; callers can supply their own tables.

use crate::resolver::{Constructor, ModuleInstance};
use std::collections::HashMap;
use std::sync::Arc;

/// Exports surfaced by an imported module.
pub struct ModuleExports {
    /// The default export, invocable as a constructor. Modules without one
    /// cannot back a visualization type.
    pub default: Option<Constructor>,
}

pub type Importer = Arc<dyn Fn() -> ModuleExports + Send + Sync>;

/// Visualization type string → catalog module path.
const CATALOG_TYPES: [(&str, &str); 15] = [
    ("WebGLTile", "layers/web_gl_tile"),
    ("ImageLayer", "layers/image"),
    ("VectorLayer", "layers/vector"),
    ("VectorTileLayer", "layers/vector_tile"),
    ("TileLayer", "layers/tile"),
    ("Image Tile", "sources/image_tile"),
    ("Vector Tile", "sources/vector_tile"),
    ("ESRI Image and Map Service", "sources/image_arcgis_rest"),
    ("Vector", "sources/vector"),
    ("WMS", "sources/image_wms"),
    ("GeoJSON", "formats/geojson"),
    ("ESRI Feature Service", "formats/esri_json"),
    ("Style", "styles/style"),
    ("Stroke", "styles/stroke"),
    ("Fill", "styles/fill"),
];

/// The resolution tables. Each importer yields the module's exports; the
/// default export constructs an instance from already-resolved props.
pub struct ModuleRegistry {
    paths: HashMap<&'static str, &'static str>,
    importers: HashMap<&'static str, Importer>,
}

impl ModuleRegistry {
    /// Registry over the built-in visualization catalog.
    pub fn new() -> Self {
        let mut importers: HashMap<&'static str, Importer> = HashMap::new();
        for (_, path) in CATALOG_TYPES {
            importers
                .entry(path)
                .or_insert_with(|| catalog_importer(path));
        }
        ModuleRegistry {
            paths: CATALOG_TYPES.into_iter().collect(),
            importers,
        }
    }

    /// Registry over caller-supplied tables.
    pub fn with_tables(
        paths: HashMap<&'static str, &'static str>,
        importers: HashMap<&'static str, Importer>,
    ) -> Self {
        ModuleRegistry { paths, importers }
    }

    pub fn module_path(&self, type_name: &str) -> Option<&'static str> {
        self.paths.get(type_name).copied()
    }

    pub fn importer(&self, module_path: &str) -> Option<Importer> {
        self.importers.get(module_path).cloned()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn catalog_importer(path: &'static str) -> Importer {
    Arc::new(move || ModuleExports {
        default: Some(Arc::new(move |props| {
            ModuleInstance::new(path.to_string(), props)
        })),
    })
}
