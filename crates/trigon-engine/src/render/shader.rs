//! Pre-built shader library with named entry points.
//!
//! WGSL is parsed and validated with `naga` when the library is built, so the
//! pipeline builder can check entry points and the shader interface before
//! any device object exists.

use std::borrow::Cow;

use super::error::{RendererError, RendererResult};

pub const VERTEX_ENTRY: &str = "vertexShader";
pub const FRAGMENT_ENTRY: &str = "fragmentShader";

/// Pipeline stage an entry point belongs to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    fn from_naga(stage: naga::ShaderStage) -> Option<Self> {
        match stage {
            naga::ShaderStage::Vertex => Some(Self::Vertex),
            naga::ShaderStage::Fragment => Some(Self::Fragment),
            naga::ShaderStage::Compute => Some(Self::Compute),
            _ => None,
        }
    }
}

/// Entry point declared by a library.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EntryPoint {
    pub name: String,
    pub stage: ShaderStage,
}

/// One `@location` input of a vertex entry point.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ShaderInput {
    pub location: u32,
    /// `None` for types no 32-bit vertex format can feed.
    pub format: Option<wgpu::VertexFormat>,
}

/// One `@group/@binding` resource declared by the module.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ShaderBinding {
    pub group: u32,
    pub binding: u32,
    pub uniform: bool,
    /// Byte size of the bound type.
    pub size: u32,
}

/// Validated WGSL module plus the entry points it declares.
#[derive(Debug, Clone)]
pub struct ShaderLibrary {
    label: String,
    source: Cow<'static, str>,
    module: naga::Module,
    entry_points: Vec<EntryPoint>,
}

impl ShaderLibrary {
    /// Parses and validates `source`. Any error is `BadPipelineDescriptor`.
    pub fn from_wgsl(
        label: impl Into<String>,
        source: impl Into<Cow<'static, str>>,
    ) -> RendererResult<Self> {
        let label = label.into();
        let source = source.into();

        let module = naga::front::wgsl::parse_str(&source).map_err(|e| {
            RendererError::BadPipelineDescriptor(format!(
                "`{label}` does not parse:\n{}",
                e.emit_to_string(&source)
            ))
        })?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator.validate(&module).map_err(|e| {
            RendererError::BadPipelineDescriptor(format!("`{label}` is invalid: {e}"))
        })?;

        let entry_points = module
            .entry_points
            .iter()
            .filter_map(|ep| {
                ShaderStage::from_naga(ep.stage).map(|stage| EntryPoint {
                    name: ep.name.clone(),
                    stage,
                })
            })
            .collect();

        Ok(Self {
            label,
            source,
            module,
            entry_points,
        })
    }

    /// Library bundled with the crate; exports `vertexShader` and `fragmentShader`.
    pub fn triangle() -> RendererResult<Self> {
        Self::from_wgsl("trigon triangle shader", include_str!("shaders/triangle.wgsl"))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn entry_points(&self) -> &[EntryPoint] {
        &self.entry_points
    }

    /// Looks up `name` and checks it is declared for `stage`.
    pub fn resolve(&self, name: &str, stage: ShaderStage) -> RendererResult<&EntryPoint> {
        let entry = self
            .entry_points
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| {
                RendererError::BadPipelineDescriptor(format!(
                    "entry point `{name}` not found in `{}`",
                    self.label
                ))
            })?;

        if entry.stage != stage {
            return Err(RendererError::BadPipelineDescriptor(format!(
                "entry point `{name}` is a {:?} function, expected {stage:?}",
                entry.stage
            )));
        }

        Ok(entry)
    }

    /// `@location` arguments of `entry`, flattened out of input structs.
    pub fn vertex_inputs(&self, entry: &EntryPoint) -> Vec<ShaderInput> {
        let Some(function) = self.function(entry) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for arg in &function.arguments {
            self.collect_locations(arg.ty, arg.binding.as_ref(), &mut |location, ty| {
                out.push(ShaderInput {
                    location,
                    format: self.vertex_format(ty),
                });
            });
        }
        out.sort_by_key(|i| i.location);
        out
    }

    /// `@location` outputs written by `entry`.
    pub fn fragment_outputs(&self, entry: &EntryPoint) -> Vec<u32> {
        let Some(result) = self.function(entry).and_then(|f| f.result.as_ref()) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        self.collect_locations(result.ty, result.binding.as_ref(), &mut |location, _| {
            out.push(location)
        });
        out.sort_unstable();
        out
    }

    /// Every resource declared with `@group/@binding`.
    pub fn bindings(&self) -> Vec<ShaderBinding> {
        let gctx = self.module.to_ctx();
        self.module
            .global_variables
            .iter()
            .filter_map(|(_, var)| {
                let rb = var.binding.as_ref()?;
                Some(ShaderBinding {
                    group: rb.group,
                    binding: rb.binding,
                    uniform: var.space == naga::AddressSpace::Uniform,
                    size: self.module.types[var.ty].inner.size(gctx),
                })
            })
            .collect()
    }

    pub(crate) fn create_module(&self, device: &wgpu::Device) -> wgpu::ShaderModule {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(self.label.as_str()),
            source: wgpu::ShaderSource::Wgsl(self.source.clone()),
        })
    }

    fn function(&self, entry: &EntryPoint) -> Option<&naga::Function> {
        self.module
            .entry_points
            .iter()
            .find(|ep| ep.name == entry.name && ShaderStage::from_naga(ep.stage) == Some(entry.stage))
            .map(|ep| &ep.function)
    }

    /// Calls `f` for the binding itself or, for unbound structs, for each member.
    fn collect_locations(
        &self,
        ty: naga::Handle<naga::Type>,
        binding: Option<&naga::Binding>,
        f: &mut dyn FnMut(u32, naga::Handle<naga::Type>),
    ) {
        match binding {
            Some(naga::Binding::Location { location, .. }) => f(*location, ty),
            Some(_) => {}
            None => {
                if let naga::TypeInner::Struct { members, .. } = &self.module.types[ty].inner {
                    for member in members {
                        self.collect_locations(member.ty, member.binding.as_ref(), f);
                    }
                }
            }
        }
    }

    fn vertex_format(&self, ty: naga::Handle<naga::Type>) -> Option<wgpu::VertexFormat> {
        use naga::{ScalarKind as K, VectorSize as N};
        use wgpu::VertexFormat as F;

        let (scalar, size) = match self.module.types[ty].inner {
            naga::TypeInner::Scalar(s) => (s, None),
            naga::TypeInner::Vector { size, scalar } => (scalar, Some(size)),
            _ => return None,
        };
        if scalar.width != 4 {
            return None;
        }

        Some(match (scalar.kind, size) {
            (K::Float, None) => F::Float32,
            (K::Float, Some(N::Bi)) => F::Float32x2,
            (K::Float, Some(N::Tri)) => F::Float32x3,
            (K::Float, Some(N::Quad)) => F::Float32x4,
            (K::Uint, None) => F::Uint32,
            (K::Uint, Some(N::Bi)) => F::Uint32x2,
            (K::Uint, Some(N::Tri)) => F::Uint32x3,
            (K::Uint, Some(N::Quad)) => F::Uint32x4,
            (K::Sint, None) => F::Sint32,
            (K::Sint, Some(N::Bi)) => F::Sint32x2,
            (K::Sint, Some(N::Tri)) => F::Sint32x3,
            (K::Sint, Some(N::Quad)) => F::Sint32x4,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOTH: &str = "
        @vertex fn vertexShader() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }
        @fragment fn fragmentShader() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }
    ";

    fn entry(lib: &ShaderLibrary, name: &str, stage: ShaderStage) -> EntryPoint {
        lib.resolve(name, stage).unwrap().clone()
    }

    // ── entry points ──────────────────────────────────────────────────────

    #[test]
    fn bundled_library_exports_both_stages() {
        let lib = ShaderLibrary::triangle().unwrap();
        assert_eq!(
            lib.resolve(VERTEX_ENTRY, ShaderStage::Vertex).unwrap().name,
            "vertexShader"
        );
        assert_eq!(
            lib.resolve(FRAGMENT_ENTRY, ShaderStage::Fragment).unwrap().name,
            "fragmentShader"
        );
        assert_eq!(lib.entry_points().len(), 2);
    }

    #[test]
    fn attribute_separated_from_its_name_still_counts() {
        let src = "
            @ vertex fn vertexShader() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }
            @fragment fn fragmentShader() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }
        ";
        let lib = ShaderLibrary::from_wgsl("spaced", src).unwrap();
        assert!(lib.resolve(VERTEX_ENTRY, ShaderStage::Vertex).is_ok());
        assert!(lib.resolve(FRAGMENT_ENTRY, ShaderStage::Fragment).is_ok());
    }

    #[test]
    fn missing_entry_point_is_bad_descriptor() {
        let lib = ShaderLibrary::from_wgsl(
            "only vertex",
            "@vertex fn vertexShader() -> @builtin(position) vec4<f32> { return vec4<f32>(); }",
        )
        .unwrap();
        let err = lib.resolve(FRAGMENT_ENTRY, ShaderStage::Fragment).unwrap_err();
        assert!(matches!(err, RendererError::BadPipelineDescriptor(_)));
    }

    #[test]
    fn wrong_stage_is_bad_descriptor() {
        let lib = ShaderLibrary::from_wgsl(
            "swapped",
            "@fragment fn vertexShader() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }",
        )
        .unwrap();
        assert!(matches!(
            lib.resolve(VERTEX_ENTRY, ShaderStage::Vertex),
            Err(RendererError::BadPipelineDescriptor(_))
        ));
    }

    #[test]
    fn plain_functions_are_not_entry_points() {
        let src = format!("fn helper() {{}}\n{BOTH}");
        let lib = ShaderLibrary::from_wgsl("helpers", src).unwrap();
        assert!(lib.resolve("helper", ShaderStage::Vertex).is_err());
        assert_eq!(lib.entry_points().len(), 2);
    }

    #[test]
    fn commented_out_entry_points_are_ignored() {
        let src = "// @vertex fn vertexShader() {}\n/* @fragment fn fragmentShader() {} */\n@compute @workgroup_size(64) fn cs() {}";
        let lib = ShaderLibrary::from_wgsl("comments", src).unwrap();
        assert_eq!(
            lib.entry_points(),
            &[EntryPoint {
                name: "cs".to_string(),
                stage: ShaderStage::Compute
            }]
        );
    }

    #[test]
    fn malformed_source_is_bad_descriptor() {
        assert!(matches!(
            ShaderLibrary::from_wgsl("broken", "@vertex fn vertexShader( {"),
            Err(RendererError::BadPipelineDescriptor(_))
        ));
        // Parses, but returns the wrong type.
        assert!(matches!(
            ShaderLibrary::from_wgsl(
                "invalid",
                "@vertex fn vertexShader() -> @builtin(position) vec4<f32> { return 1u; }"
            ),
            Err(RendererError::BadPipelineDescriptor(_))
        ));
    }

    // ── interface ─────────────────────────────────────────────────────────

    #[test]
    fn bundled_interface_matches_binding_contract() {
        let lib = ShaderLibrary::triangle().unwrap();

        let vs = entry(&lib, VERTEX_ENTRY, ShaderStage::Vertex);
        assert_eq!(
            lib.vertex_inputs(&vs),
            vec![
                ShaderInput { location: 0, format: Some(wgpu::VertexFormat::Float32x3) },
                ShaderInput { location: 1, format: Some(wgpu::VertexFormat::Float32x3) },
            ]
        );

        let fs = entry(&lib, FRAGMENT_ENTRY, ShaderStage::Fragment);
        assert_eq!(lib.fragment_outputs(&fs), vec![0]);

        assert_eq!(
            lib.bindings(),
            vec![ShaderBinding { group: 0, binding: 2, uniform: true, size: 64 }]
        );
    }

    #[test]
    fn integer_inputs_and_struct_members_are_reported() {
        let src = "
            struct In {
                @location(3) c: vec2<i32>,
                @builtin(vertex_index) i: u32,
            }
            @vertex fn vertexShader(@location(0) p: vec4<u32>, v: In)
                -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }
        ";
        let lib = ShaderLibrary::from_wgsl("uint input", src).unwrap();
        let vs = entry(&lib, VERTEX_ENTRY, ShaderStage::Vertex);
        assert_eq!(
            lib.vertex_inputs(&vs),
            vec![
                ShaderInput { location: 0, format: Some(wgpu::VertexFormat::Uint32x4) },
                ShaderInput { location: 3, format: Some(wgpu::VertexFormat::Sint32x2) },
            ]
        );
    }
}
