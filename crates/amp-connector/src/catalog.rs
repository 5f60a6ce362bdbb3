//! Endpoint catalog
//!
//! Declarative `(module, object) -> {method, path}` lookups for each
//! operation, plus loading of the bundled `schemas.json` document.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::datautils::DefaultMap;
use crate::error::{ConnectorError, ConnectorResult};
use crate::operation::{DeleteParams, ReadParams, WriteParams};
use crate::schema::{FieldMetadata, FieldValue, ObjectMetadata};
use crate::types::{HttpMethod, ModuleId, ValueType};
use crate::urlbuilder::UrlBuilder;

/// Marker replaced by the record ID in path templates.
pub const RECORD_ID_PLACEHOLDER: &str = "{{.recordID}}";

/// Method and path template of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSpec {
    pub method: HttpMethod,
    pub path: String,
}

impl OperationSpec {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }

    /// Final path for `record_id`.
    ///
    /// The ID replaces [`RECORD_ID_PLACEHOLDER`] when the template has one and
    /// is appended as `/{id}` otherwise, leaving the path itself untouched.
    /// Templates with the placeholder need a non-empty ID.
    pub fn path_for(&self, record_id: &str) -> ConnectorResult<String> {
        let templated = self.path.contains(RECORD_ID_PLACEHOLDER);
        if record_id.is_empty() {
            if templated {
                return Err(ConnectorError::missing_parameter("recordId"));
            }
            return Ok(self.path.clone());
        }
        if templated {
            Ok(self.path.replace(RECORD_ID_PLACEHOLDER, record_id))
        } else {
            Ok(format!("{}/{}", self.path, record_id))
        }
    }
}

type Fallback = Arc<dyn Fn(&str) -> Option<OperationSpec> + Send + Sync>;

/// Per-module object-to-operation mapping with an optional fallback.
#[derive(Clone)]
pub struct OperationRegistry {
    default_method: HttpMethod,
    modules: HashMap<ModuleId, DefaultMap<String, OperationSpec>>,
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("default_method", &self.default_method)
            .field("modules", &self.modules)
            .finish()
    }
}

impl OperationRegistry {
    /// Create an empty registry whose [`with_object`](Self::with_object)
    /// entries use `default_method`.
    pub fn new(default_method: HttpMethod) -> Self {
        Self {
            default_method,
            modules: HashMap::new(),
        }
    }

    pub fn default_method(&self) -> HttpMethod {
        self.default_method
    }

    fn module_entry(&mut self, module: ModuleId) -> &mut DefaultMap<String, OperationSpec> {
        self.modules
            .entry(module)
            .or_insert_with(|| DefaultMap::new(HashMap::new()))
    }

    /// Register `object` under `path` with the registry's default method.
    pub fn with_object(
        mut self,
        module: impl Into<ModuleId>,
        object: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        let spec = OperationSpec::new(self.default_method, path);
        self.module_entry(module.into()).insert(object.into(), spec);
        self
    }

    pub fn with_operation(
        mut self,
        module: impl Into<ModuleId>,
        object: impl Into<String>,
        spec: OperationSpec,
    ) -> Self {
        self.module_entry(module.into()).insert(object.into(), spec);
        self
    }

    /// Answer objects missing from `module` with `fallback`.
    pub fn with_fallback(
        mut self,
        module: impl Into<ModuleId>,
        fallback: impl Fn(&str) -> Option<OperationSpec> + Send + Sync + 'static,
    ) -> Self {
        let fallback: Fallback = Arc::new(fallback);
        self.module_entry(module.into())
            .set_fallback(move |object: &String| fallback(object.as_str()));
        self
    }

    /// Fallback that maps every object to `{prefix}/{object}`.
    pub fn with_path_fallback(self, module: impl Into<ModuleId>, prefix: impl Into<String>) -> Self {
        let method = self.default_method;
        let prefix = prefix.into();
        self.with_fallback(module, move |object| {
            Some(OperationSpec::new(
                method,
                format!("{}/{}", prefix.trim_end_matches('/'), object),
            ))
        })
    }

    pub fn lookup(&self, module: &ModuleId, object: &str) -> Option<OperationSpec> {
        self.modules.get(module)?.get(&object.to_string())
    }

    /// Objects registered explicitly for `module`, sorted.
    pub fn objects(&self, module: &ModuleId) -> Vec<String> {
        let mut names: Vec<String> = self
            .modules
            .get(module)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// A resolved request target.
#[derive(Debug, Clone)]
pub struct ResolvedOperation {
    pub url: UrlBuilder,
    pub method: HttpMethod,
}

/// The operation registries of a connector, bound to a base URL and module.
#[derive(Debug, Clone)]
pub struct EndpointCatalog {
    base_url: String,
    module: ModuleId,
    read: OperationRegistry,
    create: OperationRegistry,
    update: OperationRegistry,
    delete: OperationRegistry,
}

impl EndpointCatalog {
    /// Create a catalog with empty registries using the conventional methods
    /// (GET, POST, PATCH, DELETE).
    pub fn new(base_url: impl Into<String>, module: impl Into<ModuleId>) -> Self {
        Self {
            base_url: base_url.into(),
            module: module.into(),
            read: OperationRegistry::new(HttpMethod::Get),
            create: OperationRegistry::new(HttpMethod::Post),
            update: OperationRegistry::new(HttpMethod::Patch),
            delete: OperationRegistry::new(HttpMethod::Delete),
        }
    }

    pub fn with_read_registry(mut self, registry: OperationRegistry) -> Self {
        self.read = registry;
        self
    }

    pub fn with_create_registry(mut self, registry: OperationRegistry) -> Self {
        self.create = registry;
        self
    }

    pub fn with_update_registry(mut self, registry: OperationRegistry) -> Self {
        self.update = registry;
        self
    }

    pub fn with_delete_registry(mut self, registry: OperationRegistry) -> Self {
        self.delete = registry;
        self
    }

    /// Answer objects missing from any registry with `{prefix}/{object}`.
    pub fn with_conventional_paths(mut self, prefix: &str) -> Self {
        let module = self.module.clone();
        self.read = self.read.with_path_fallback(module.clone(), prefix);
        self.create = self.create.with_path_fallback(module.clone(), prefix);
        self.update = self.update.with_path_fallback(module.clone(), prefix);
        self.delete = self.delete.with_path_fallback(module, prefix);
        self
    }

    pub fn module(&self) -> &ModuleId {
        &self.module
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn read_registry(&self) -> &OperationRegistry {
        &self.read
    }

    /// The update registry when a record ID is given, the create registry otherwise.
    pub fn choose_write_registry(&self, record_id: &str) -> &OperationRegistry {
        if record_id.is_empty() {
            &self.create
        } else {
            &self.update
        }
    }

    fn resolve(
        &self,
        registry: &OperationRegistry,
        operation: &str,
        object: &str,
        record_id: &str,
    ) -> ConnectorResult<ResolvedOperation> {
        let spec = registry.lookup(&self.module, object).ok_or_else(|| {
            ConnectorError::ObjectNotSupported {
                module: self.module.to_string(),
                object: object.to_string(),
                operation: operation.to_string(),
            }
        })?;
        let path = spec.path_for(record_id)?;
        let url = UrlBuilder::new(&self.base_url)?.add_path([path.as_str()]);
        debug!(operation, object, method = %spec.method, path = %url.path(), "Resolved operation");
        Ok(ResolvedOperation {
            url,
            method: spec.method,
        })
    }

    pub fn create_read_operation(&self, params: &ReadParams) -> ConnectorResult<ResolvedOperation> {
        self.resolve(&self.read, "read", &params.object_name, "")
    }

    pub fn create_write_operation(
        &self,
        params: &WriteParams,
    ) -> ConnectorResult<ResolvedOperation> {
        let registry = self.choose_write_registry(&params.record_id);
        self.resolve(registry, "write", &params.object_name, &params.record_id)
    }

    pub fn create_delete_operation(
        &self,
        params: &DeleteParams,
    ) -> ConnectorResult<ResolvedOperation> {
        self.resolve(&self.delete, "delete", &params.object_name, &params.record_id)
    }
}

/// One field of a bundled schema.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticField {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub provider_type: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub values: Vec<FieldValue>,
}

/// One object of a bundled schema.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticObject {
    #[serde(default)]
    pub display_name: String,
    pub url_path: String,
    /// Key of the records array in read responses.
    #[serde(default)]
    pub response_key: String,
    #[serde(default)]
    pub fields: HashMap<String, StaticField>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticModule {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub objects: HashMap<String, StaticObject>,
}

/// The bundled `schemas.json` document of a provider.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StaticSchemas {
    #[serde(default)]
    pub modules: HashMap<ModuleId, StaticModule>,
}

impl StaticSchemas {
    pub fn from_json(bytes: &[u8]) -> ConnectorResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn object(&self, module: &ModuleId, object: &str) -> Option<&StaticObject> {
        self.modules.get(module)?.objects.get(object)
    }

    /// Read-only registry: every object is a GET of `module.path + object.urlPath`.
    pub fn operation_registry(&self) -> OperationRegistry {
        let mut registry = OperationRegistry::new(HttpMethod::Get);
        for (module_id, module) in &self.modules {
            for (name, object) in &module.objects {
                let path = format!(
                    "{}/{}",
                    module.path.trim_end_matches('/'),
                    object.url_path.trim_start_matches('/')
                );
                registry = registry.with_object(module_id.clone(), name.clone(), path);
            }
        }
        registry
    }

    /// Object metadata for `object`, or `ObjectNotSupported`.
    pub fn object_metadata(&self, module: &ModuleId, object: &str) -> ConnectorResult<ObjectMetadata> {
        let entry = self
            .object(module, object)
            .ok_or_else(|| ConnectorError::ObjectNotSupported {
                module: module.to_string(),
                object: object.to_string(),
                operation: "metadata".to_string(),
            })?;
        let display = if entry.display_name.is_empty() {
            object.to_string()
        } else {
            entry.display_name.clone()
        };
        let mut metadata = ObjectMetadata::new(display);
        for (name, field) in &entry.fields {
            let display = if field.display_name.is_empty() {
                name.clone()
            } else {
                field.display_name.clone()
            };
            let mut meta = FieldMetadata::new(display, field.value_type)
                .with_provider_type(field.provider_type.clone())
                .with_values(field.values.clone());
            meta.read_only = field.read_only;
            metadata.add_field(name.clone(), meta);
        }
        Ok(metadata)
    }

    /// `(module, object) -> responseKey` for objects that declare one.
    pub fn response_keys(&self) -> HashMap<ModuleId, HashMap<String, String>> {
        self.modules
            .iter()
            .map(|(module_id, module)| {
                let keys = module
                    .objects
                    .iter()
                    .filter(|(_, o)| !o.response_key.is_empty())
                    .map(|(name, o)| (name.clone(), o.response_key.clone()))
                    .collect();
                (module_id.clone(), keys)
            })
            .collect()
    }
}

/// Build the read registry of a bundled schema.
pub fn operation_registry_from_static_schema(schemas: &StaticSchemas) -> OperationRegistry {
    schemas.operation_registry()
}
