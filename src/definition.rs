//! Block definitions and the type-tag registry.
//!
//! A definition is looked up once when a block is created; the block keeps an
//! `Rc` to it for its capability flags and mutation hooks. `init` only
//! declares the shape into a [`BlockBuilder`]; the workspace turns that into
//! fields, inputs and connections.

use crate::block::{Field, InputKind};
use crate::connection::TypeCheck;
use crate::error::Result;
use crate::wiring::{PinKind, WiringTable};
use crate::{Block, BlockId, Workspace};
use std::collections::HashMap;
use std::rc::Rc;

/// Explicit capability tags queried instead of probing for behavior
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub procedure_definition: bool,
    pub procedure_call: bool,
    /// Definition or call of a procedure that yields a value
    pub procedure_returns: bool,
}

/// Save/restore hooks for blocks whose shape changes after creation
#[derive(Debug, Clone, Copy)]
pub struct MutationHooks {
    /// Describe the current extra shape, `None` when it matches the default
    pub save: fn(&Block) -> Option<serde_json::Value>,

    /// Reshape a freshly created block from a saved description
    pub load: fn(&mut Workspace, BlockId, &serde_json::Value) -> Result<()>,
}

/// Behavior descriptor for one block type
#[derive(Debug, Clone)]
pub struct BlockDefinition {
    pub type_tag: String,
    pub category: String,
    pub help_url: Option<String>,
    pub init: fn(&mut BlockBuilder),
    pub capabilities: Capabilities,
    pub mutation: Option<MutationHooks>,
}

impl BlockDefinition {
    pub fn new(type_tag: impl Into<String>, category: impl Into<String>, init: fn(&mut BlockBuilder)) -> Self {
        Self {
            type_tag: type_tag.into(),
            category: category.into(),
            help_url: None,
            init,
            capabilities: Capabilities::default(),
            mutation: None,
        }
    }

    pub fn with_help_url(mut self, url: impl Into<String>) -> Self {
        self.help_url = Some(url.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_mutation(mut self, hooks: MutationHooks) -> Self {
        self.mutation = Some(hooks);
        self
    }
}

/// Declared input, before it is materialized on a block
#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    pub name: String,
    pub kind: InputKind,
    pub label: Option<String>,
    pub check: TypeCheck,
    pub variable: Option<Field>,
}

impl InputSpec {
    pub fn value(name: impl Into<String>, label: Option<&str>, check: TypeCheck) -> Self {
        Self {
            name: name.into(),
            kind: InputKind::Value,
            label: label.map(str::to_string),
            check,
            variable: None,
        }
    }

    pub fn statement(name: impl Into<String>, label: Option<&str>) -> Self {
        Self {
            name: name.into(),
            kind: InputKind::Statement,
            label: label.map(str::to_string),
            check: None,
            variable: None,
        }
    }

    pub fn dummy(name: impl Into<String>, label: Option<&str>) -> Self {
        Self {
            name: name.into(),
            kind: InputKind::Dummy,
            label: label.map(str::to_string),
            check: None,
            variable: None,
        }
    }

    /// Inline variable-name field; the field is named after the input
    pub fn local_variable(name: impl Into<String>, label: Option<&str>, default: &str) -> Self {
        let name = name.into();
        Self {
            variable: Some(Field::text(name.clone(), default)),
            name,
            kind: InputKind::LocalVariable,
            label: label.map(str::to_string),
            check: None,
        }
    }
}

/// Shape declared by a definition's `init`
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    pub(crate) type_tag: String,
    pub(crate) wiring: WiringTable,
    pub(crate) colour: u16,
    pub(crate) fields: Vec<Field>,
    pub(crate) inputs: Vec<InputSpec>,
    pub(crate) output: Option<TypeCheck>,
    pub(crate) previous: Option<TypeCheck>,
    pub(crate) next: Option<TypeCheck>,
    pub(crate) inputs_inline: bool,
    pub(crate) tooltip: String,
}

impl BlockBuilder {
    pub fn new(type_tag: impl Into<String>, wiring: WiringTable) -> Self {
        Self {
            type_tag: type_tag.into(),
            wiring,
            colour: 0,
            fields: Vec::new(),
            inputs: Vec::new(),
            output: None,
            previous: None,
            next: None,
            inputs_inline: false,
            tooltip: String::new(),
        }
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn colour(&mut self, hue: u16) -> &mut Self {
        self.colour = hue;
        self
    }

    /// Static text on the title row
    pub fn title(&mut self, text: &str) -> &mut Self {
        self.fields.push(Field::label(text));
        self
    }

    pub fn text_field(&mut self, name: &str, default: &str) -> &mut Self {
        self.fields.push(Field::text(name, default));
        self
    }

    pub fn dropdown(&mut self, name: &str, options: &[(&str, &str)]) -> &mut Self {
        let options = options
            .iter()
            .map(|(text, value)| (text.to_string(), value.to_string()))
            .collect();
        self.fields.push(Field::dropdown(name, options));
        self
    }

    /// Dropdown listing the board pins of one kind
    pub fn pin_dropdown(&mut self, name: &str, kind: PinKind) -> &mut Self {
        let options = self.wiring.dropdown_options(kind);
        self.fields.push(Field::dropdown(name, options));
        self
    }

    pub fn input(&mut self, spec: InputSpec) -> &mut Self {
        self.inputs.push(spec);
        self
    }

    pub fn value_input(&mut self, name: &str, label: Option<&str>, check: TypeCheck) -> &mut Self {
        self.input(InputSpec::value(name, label, check))
    }

    pub fn statement_input(&mut self, name: &str, label: Option<&str>) -> &mut Self {
        self.input(InputSpec::statement(name, label))
    }

    pub fn output(&mut self, check: TypeCheck) -> &mut Self {
        self.output = Some(check);
        self
    }

    pub fn previous_statement(&mut self, check: TypeCheck) -> &mut Self {
        self.previous = Some(check);
        self
    }

    pub fn next_statement(&mut self, check: TypeCheck) -> &mut Self {
        self.next = Some(check);
        self
    }

    pub fn inputs_inline(&mut self, inline: bool) -> &mut Self {
        self.inputs_inline = inline;
        self
    }

    pub fn tooltip(&mut self, text: &str) -> &mut Self {
        self.tooltip = text.to_string();
        self
    }
}

/// Type tag to definition lookup
#[derive(Debug, Clone, Default)]
pub struct BlockRegistry {
    definitions: HashMap<String, Rc<BlockDefinition>>,
}

impl BlockRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            definitions: HashMap::new(),
        }
    }

    /// Registry holding the built-in block library
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::library::register_builtins(&mut registry);
        registry
    }

    /// Add or replace a definition
    pub fn register(&mut self, definition: BlockDefinition) {
        self.definitions
            .insert(definition.type_tag.clone(), Rc::new(definition));
    }

    pub fn get(&self, type_tag: &str) -> Option<Rc<BlockDefinition>> {
        self.definitions.get(type_tag).cloned()
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.definitions.contains_key(type_tag)
    }

    /// Registered type tags of one category, sorted
    pub fn types_in_category(&self, category: &str) -> Vec<&str> {
        let mut types: Vec<&str> = self
            .definitions
            .values()
            .filter(|d| d.category == category)
            .map(|d| d.type_tag.as_str())
            .collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nop(block: &mut BlockBuilder) {
        block.colour(0).title("nop").previous_statement(None).next_statement(None);
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = BlockRegistry::new();
        assert!(registry.is_empty());

        registry.register(BlockDefinition::new("nop", "Wiring", nop));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("nop"));

        let definition = registry.get("nop").unwrap();
        assert_eq!(definition.category, "Wiring");
        assert_eq!(definition.capabilities, Capabilities::default());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_builder_declares_shape() {
        let mut builder = BlockBuilder::new("nop", WiringTable::new());
        nop(&mut builder);
        assert_eq!(builder.fields.len(), 1);
        assert!(builder.previous.is_some());
        assert!(builder.next.is_some());
        assert!(builder.output.is_none());
    }

    #[test]
    fn test_local_variable_spec_names_its_field() {
        let spec = InputSpec::local_variable("VAR", Some("with"), "i");
        let field = spec.variable.unwrap();
        assert_eq!(field.name.as_deref(), Some("VAR"));
        assert_eq!(field.value(), "i");
    }

    #[test]
    fn test_builtins_by_category() {
        let registry = BlockRegistry::with_builtins();
        let wiring = registry.types_in_category("Wiring");
        assert!(wiring.contains(&"led"));
        assert!(wiring.contains(&"servo"));
    }
}
