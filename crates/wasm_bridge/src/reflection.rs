//! Vertex buffer layouts derived from shader reflection metadata.
//!
//! The reflection JSON lists a shader's entry points and their parameters.
//! Parameters bound as vertex-stage inputs are flattened depth-first into a
//! single interleaved buffer layout: attributes appear in declaration order
//! and each one starts where the previous one ended.

use anyhow::{Result as AnyResult, anyhow, bail};
use core::fmt;
use core::str::FromStr;
use serde::Deserialize;
use wgpu::VertexFormat;

/// Binding kind marking a vertex-stage input.
pub const VERTEX_INPUT_BINDING: &str = "varyingInput";

/// Entry point names used when the reflection carries no stage information.
pub const DEFAULT_VERTEX_ENTRY: &str = "vs_main";
pub const DEFAULT_FRAGMENT_ENTRY: &str = "fs_main";

/// Reflection metadata for one compiled shader.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShaderReflection {
    #[serde(default)]
    pub entry_points: Vec<EntryPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntryPoint {
    pub name: String,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl EntryPoint {
    fn is_stage(&self, stage: &str, fallback_name: &str) -> bool {
        self.stage
            .as_deref()
            .map_or(self.name == fallback_name, |declared| declared == stage)
    }
}

/// A parameter or struct field.
#[derive(Debug, Clone, Deserialize)]
pub struct Parameter {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub binding: Option<Binding>,
    #[serde(rename = "type")]
    pub ty: TypeDesc,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Binding {
    pub kind: String,
    #[serde(default)]
    pub index: u32,
}

/// Type of a parameter. Only the fields used by layout compilation are read.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDesc {
    pub kind: String,
    #[serde(default)]
    pub fields: Vec<Parameter>,
    #[serde(default)]
    pub element_count: Option<u32>,
    #[serde(default)]
    pub element_type: Option<Box<TypeDesc>>,
    #[serde(default)]
    pub scalar_type: Option<String>,
}

impl TypeDesc {
    fn scalar(&self) -> AnyResult<ScalarType> {
        self.scalar_type
            .as_deref()
            .ok_or_else(|| anyhow!("`{}` type carries no scalar type", self.kind))?
            .parse()
    }
}

/// Scalar element types a vertex attribute may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Float32,
    Uint32,
    Int32,
}

impl ScalarType {
    /// Size in bytes of one element.
    pub const fn size(self) -> u64 {
        match self {
            Self::Float32 | Self::Uint32 | Self::Int32 => 4,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::Uint32 => "uint32",
            Self::Int32 => "int32",
        }
    }
}

impl FromStr for ScalarType {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> AnyResult<Self> {
        match name {
            "float32" => Ok(Self::Float32),
            "uint32" => Ok(Self::Uint32),
            "int32" => Ok(Self::Int32),
            other => Err(anyhow!("unsupported scalar type `{other}`")),
        }
    }
}

/// Element type and component count of one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeFormat {
    pub scalar: ScalarType,
    pub components: u32,
}

impl AttributeFormat {
    pub const fn size(self) -> u64 {
        self.scalar.size() * self.components as u64
    }

    /// The matching wgpu vertex format.
    ///
    /// # Errors
    /// Returns an error for component counts outside 1..=4.
    pub fn to_wgpu(self) -> AnyResult<VertexFormat> {
        let format = match (self.scalar, self.components) {
            (ScalarType::Float32, 1) => VertexFormat::Float32,
            (ScalarType::Float32, 2) => VertexFormat::Float32x2,
            (ScalarType::Float32, 3) => VertexFormat::Float32x3,
            (ScalarType::Float32, 4) => VertexFormat::Float32x4,
            (ScalarType::Uint32, 1) => VertexFormat::Uint32,
            (ScalarType::Uint32, 2) => VertexFormat::Uint32x2,
            (ScalarType::Uint32, 3) => VertexFormat::Uint32x3,
            (ScalarType::Uint32, 4) => VertexFormat::Uint32x4,
            (ScalarType::Int32, 1) => VertexFormat::Sint32,
            (ScalarType::Int32, 2) => VertexFormat::Sint32x2,
            (ScalarType::Int32, 3) => VertexFormat::Sint32x3,
            (ScalarType::Int32, 4) => VertexFormat::Sint32x4,
            _ => bail!("no vertex format for {self}"),
        };
        Ok(format)
    }
}

impl fmt::Display for AttributeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components == 1 {
            f.write_str(self.scalar.name())
        } else {
            write!(f, "{}x{}", self.scalar.name(), self.components)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub shader_location: u32,
    pub offset: u64,
    pub format: AttributeFormat,
}

/// A single interleaved vertex buffer layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: u64,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Attributes converted for a wgpu `VertexBufferLayout`.
    ///
    /// # Errors
    /// Returns an error if an attribute has no wgpu equivalent.
    pub fn wgpu_attributes(&self) -> AnyResult<Vec<wgpu::VertexAttribute>> {
        self.attributes
            .iter()
            .map(|attribute| {
                Ok(wgpu::VertexAttribute {
                    format: attribute.format.to_wgpu()?,
                    offset: attribute.offset,
                    shader_location: attribute.shader_location,
                })
            })
            .collect()
    }

    fn push(&mut self, shader_location: u32, format: AttributeFormat) {
        self.attributes.push(VertexAttribute {
            shader_location,
            offset: self.stride,
            format,
        });
        self.stride += format.size();
    }

    fn add_parameter(&mut self, param: &Parameter) -> AnyResult<()> {
        let Some(binding) = param
            .binding
            .as_ref()
            .filter(|binding| binding.kind == VERTEX_INPUT_BINDING)
        else {
            return Ok(());
        };
        let ty = &param.ty;
        match ty.kind.as_str() {
            "struct" => {
                for field in &ty.fields {
                    self.add_parameter(field)?;
                }
            }
            "vector" => {
                let element = ty
                    .element_type
                    .as_deref()
                    .ok_or_else(|| anyhow!("vector input `{}` has no element type", param.name))?;
                let components = ty
                    .element_count
                    .filter(|count| (1..=4).contains(count))
                    .ok_or_else(|| {
                        anyhow!("vector input `{}` has an invalid element count", param.name)
                    })?;
                let scalar = element
                    .scalar()
                    .map_err(|err| anyhow!("vertex input `{}`: {err}", param.name))?;
                self.push(binding.index, AttributeFormat { scalar, components });
            }
            "scalar" => {
                let scalar = ty
                    .scalar()
                    .map_err(|err| anyhow!("vertex input `{}`: {err}", param.name))?;
                self.push(binding.index, AttributeFormat {
                    scalar,
                    components: 1,
                });
            }
            other => bail!("vertex input `{}` has unsupported type kind `{other}`", param.name),
        }
        Ok(())
    }
}

impl ShaderReflection {
    /// Parse reflection JSON.
    ///
    /// # Errors
    /// Returns an error if the text is not valid reflection JSON.
    pub fn from_json(text: &str) -> AnyResult<Self> {
        serde_json::from_str(text).map_err(|err| anyhow!("invalid shader reflection: {err}"))
    }

    /// The entry point designated as the vertex stage.
    pub fn vertex_entry(&self) -> Option<&EntryPoint> {
        self.entry_points
            .iter()
            .find(|entry| entry.is_stage("vertex", DEFAULT_VERTEX_ENTRY))
    }

    /// The entry point designated as the fragment stage.
    pub fn fragment_entry(&self) -> Option<&EntryPoint> {
        self.entry_points
            .iter()
            .find(|entry| entry.is_stage("fragment", DEFAULT_FRAGMENT_ENTRY))
    }

    /// Compile the vertex-stage inputs into one buffer layout.
    ///
    /// A shader without a vertex entry point yields an empty layout.
    ///
    /// # Errors
    /// Returns an error for unsupported scalar types or type kinds.
    pub fn vertex_layout(&self) -> AnyResult<VertexLayout> {
        let mut layout = VertexLayout::default();
        if let Some(entry) = self.vertex_entry() {
            for param in &entry.parameters {
                layout.add_parameter(param)?;
            }
        }
        Ok(layout)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Tests fail loudly on unexpected errors")]
mod tests {
    use super::*;

    const STRUCT_INPUT: &str = r#"{
        "entryPoints": [
            {
                "name": "vs_main",
                "stage": "vertex",
                "parameters": [
                    {
                        "name": "input",
                        "binding": { "kind": "varyingInput", "index": 0, "count": 2 },
                        "type": {
                            "kind": "struct",
                            "name": "VertexInput",
                            "fields": [
                                {
                                    "name": "position",
                                    "binding": { "kind": "varyingInput", "index": 3 },
                                    "type": {
                                        "kind": "vector",
                                        "elementCount": 2,
                                        "elementType": { "kind": "scalar", "scalarType": "float32" }
                                    }
                                },
                                {
                                    "name": "shade",
                                    "binding": { "kind": "varyingInput", "index": 1 },
                                    "type": { "kind": "scalar", "scalarType": "float32" }
                                }
                            ]
                        }
                    },
                    {
                        "name": "instance",
                        "binding": { "kind": "systemValue" },
                        "type": { "kind": "scalar", "scalarType": "uint32" }
                    }
                ]
            },
            { "name": "fs_main", "stage": "fragment", "parameters": [] }
        ]
    }"#;

    fn scalar_param(name: &str, kind: &str, scalar: &str) -> Parameter {
        Parameter {
            name: name.to_owned(),
            binding: Some(Binding {
                kind: kind.to_owned(),
                index: 0,
            }),
            ty: TypeDesc {
                kind: "scalar".to_owned(),
                fields: Vec::new(),
                element_count: None,
                element_type: None,
                scalar_type: Some(scalar.to_owned()),
            },
        }
    }

    fn reflection_with(parameters: Vec<Parameter>) -> ShaderReflection {
        ShaderReflection {
            entry_points: vec![EntryPoint {
                name: "main".to_owned(),
                stage: Some("vertex".to_owned()),
                parameters,
            }],
        }
    }

    #[test]
    fn struct_fields_follow_declaration_order() {
        let reflection = ShaderReflection::from_json(STRUCT_INPUT).unwrap();
        let layout = reflection.vertex_layout().unwrap();
        assert_eq!(layout.stride, 12);
        let summary: Vec<_> = layout
            .attributes
            .iter()
            .map(|attr| (attr.shader_location, attr.offset, attr.format.to_string()))
            .collect();
        assert_eq!(summary, vec![
            (3, 0, "float32x2".to_owned()),
            (1, 8, "float32".to_owned()),
        ]);
    }

    #[test]
    fn non_input_parameters_take_no_space() {
        let reflection = reflection_with(vec![
            scalar_param("vertex_id", "systemValue", "uint32"),
            scalar_param("weight", VERTEX_INPUT_BINDING, "float32"),
            scalar_param("uniforms", "constantBuffer", "float32"),
        ]);
        let layout = reflection.vertex_layout().unwrap();
        assert_eq!(layout.stride, 4);
        assert_eq!(layout.attributes.len(), 1);
        assert_eq!(layout.attributes[0].offset, 0);
    }

    #[test]
    fn unknown_scalar_is_rejected() {
        let reflection = reflection_with(vec![scalar_param("half", VERTEX_INPUT_BINDING, "float16")]);
        let err = reflection.vertex_layout().unwrap_err();
        assert!(err.to_string().contains("unsupported scalar type `float16`"));
    }

    #[test]
    fn unknown_type_kind_is_rejected() {
        let mut param = scalar_param("transform", VERTEX_INPUT_BINDING, "float32");
        param.ty.kind = "matrix".to_owned();
        let err = reflection_with(vec![param]).vertex_layout().unwrap_err();
        assert!(err.to_string().contains("unsupported type kind `matrix`"));
    }

    #[test]
    fn missing_vertex_entry_gives_empty_layout() {
        let reflection = ShaderReflection {
            entry_points: vec![EntryPoint {
                name: "cs_main".to_owned(),
                stage: Some("compute".to_owned()),
                parameters: vec![scalar_param("x", VERTEX_INPUT_BINDING, "float32")],
            }],
        };
        let layout = reflection.vertex_layout().unwrap();
        assert!(layout.is_empty());
        assert_eq!(layout.stride, 0);
    }

    #[test]
    fn entry_name_is_used_without_stage() {
        let reflection = ShaderReflection::from_json(
            r#"{ "entryPoints": [ { "name": "fs_main" }, { "name": "vs_main" } ] }"#,
        )
        .unwrap();
        assert_eq!(reflection.vertex_entry().unwrap().name, "vs_main");
        assert_eq!(reflection.fragment_entry().unwrap().name, "fs_main");
    }

    #[test]
    fn formats_map_to_wgpu() {
        let format = AttributeFormat {
            scalar: ScalarType::Int32,
            components: 3,
        };
        assert_eq!(format.to_wgpu().unwrap(), VertexFormat::Sint32x3);
        assert_eq!(format.size(), 12);
        let too_wide = AttributeFormat {
            scalar: ScalarType::Float32,
            components: 5,
        };
        assert!(too_wide.to_wgpu().is_err());
    }
}
