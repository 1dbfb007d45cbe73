//! Built-in block library.

use crate::connection::check;
use crate::definition::{BlockBuilder, BlockDefinition, BlockRegistry, Capabilities, InputSpec, MutationHooks};
use crate::error::{BlockError, Result};
use crate::wiring::PinKind;
use crate::{Block, BlockId, Workspace};
use serde_json::{json, Value};

pub const CATEGORY_MATH: &str = "Math";
pub const CATEGORY_LOGIC: &str = "Logic";
pub const CATEGORY_CONTROL: &str = "Control";
pub const CATEGORY_VARIABLES: &str = "Variables";
pub const CATEGORY_PROCEDURES: &str = "Procedures";
pub const CATEGORY_WIRING: &str = "Wiring";

/// Register every built-in block type
pub fn register_builtins(registry: &mut BlockRegistry) {
    registry.register(BlockDefinition::new("math_number", CATEGORY_MATH, math_number));
    registry.register(BlockDefinition::new("math_arithmetic", CATEGORY_MATH, math_arithmetic));

    registry.register(BlockDefinition::new("logic_boolean", CATEGORY_LOGIC, logic_boolean));
    registry.register(BlockDefinition::new("logic_compare", CATEGORY_LOGIC, logic_compare));

    registry.register(
        BlockDefinition::new("controls_if", CATEGORY_CONTROL, controls_if).with_mutation(MutationHooks {
            save: save_if_arms,
            load: load_if_arms,
        }),
    );
    registry.register(BlockDefinition::new("controls_for", CATEGORY_CONTROL, controls_for));
    registry.register(BlockDefinition::new("controls_while", CATEGORY_CONTROL, controls_while));
    registry.register(BlockDefinition::new("wiring_delay", CATEGORY_CONTROL, wiring_delay));

    registry.register(BlockDefinition::new("variables_get", CATEGORY_VARIABLES, variables_get));
    registry.register(BlockDefinition::new("variables_set", CATEGORY_VARIABLES, variables_set));

    registry.register(
        BlockDefinition::new("procedures_defnoreturn", CATEGORY_PROCEDURES, procedures_defnoreturn)
            .with_capabilities(Capabilities {
                procedure_definition: true,
                ..Capabilities::default()
            }),
    );
    registry.register(
        BlockDefinition::new("procedures_defreturn", CATEGORY_PROCEDURES, procedures_defreturn)
            .with_capabilities(Capabilities {
                procedure_definition: true,
                procedure_returns: true,
                ..Capabilities::default()
            }),
    );
    registry.register(
        BlockDefinition::new("procedures_callnoreturn", CATEGORY_PROCEDURES, procedures_callnoreturn)
            .with_capabilities(Capabilities {
                procedure_call: true,
                ..Capabilities::default()
            }),
    );
    registry.register(
        BlockDefinition::new("procedures_callreturn", CATEGORY_PROCEDURES, procedures_callreturn)
            .with_capabilities(Capabilities {
                procedure_call: true,
                procedure_returns: true,
                ..Capabilities::default()
            }),
    );

    registry.register(
        BlockDefinition::new("led", CATEGORY_WIRING, led).with_help_url("http://en.wikipedia.org/wiki/Led"),
    );
    registry.register(
        BlockDefinition::new("output", CATEGORY_WIRING, output)
            .with_help_url("http://en.wikipedia.org/wiki/Input/output"),
    );
    registry.register(
        BlockDefinition::new("input", CATEGORY_WIRING, input)
            .with_help_url("http://en.wikipedia.org/wiki/Input/output"),
    );
    registry.register(
        BlockDefinition::new("servo", CATEGORY_WIRING, servo)
            .with_help_url("http://en.wikipedia.org/wiki/Servo_drive"),
    );
    registry.register(
        BlockDefinition::new("optocoupler", CATEGORY_WIRING, optocoupler)
            .with_help_url("http://en.wikipedia.org/wiki/Optocoupler"),
    );
}

// ========== Math ==========

fn math_number(block: &mut BlockBuilder) {
    block
        .colour(230)
        .text_field("NUM", "0")
        .output(check(&["Number"]))
        .tooltip("A number.");
}

fn math_arithmetic(block: &mut BlockBuilder) {
    block
        .colour(230)
        .value_input("A", None, check(&["Number"]))
        .value_input("B", None, check(&["Number"]))
        .dropdown(
            "OP",
            &[("+", "ADD"), ("-", "MINUS"), ("×", "MULTIPLY"), ("÷", "DIVIDE")],
        )
        .output(check(&["Number"]))
        .inputs_inline(true)
        .tooltip("Arithmetic on two numbers.");
}

// ========== Logic ==========

fn logic_boolean(block: &mut BlockBuilder) {
    block
        .colour(120)
        .dropdown("BOOL", &[("true", "TRUE"), ("false", "FALSE")])
        .output(check(&["Boolean"]))
        .tooltip("Either true or false.");
}

fn logic_compare(block: &mut BlockBuilder) {
    block
        .colour(120)
        .value_input("A", None, None)
        .dropdown(
            "OP",
            &[("=", "EQ"), ("≠", "NEQ"), ("<", "LT"), ("≤", "LTE"), (">", "GT"), ("≥", "GTE")],
        )
        .value_input("B", None, None)
        .output(check(&["Boolean"]))
        .inputs_inline(true)
        .tooltip("Compare two values.");
}

// ========== Control ==========

fn controls_if(block: &mut BlockBuilder) {
    block
        .colour(120)
        .value_input("IF0", Some("if"), check(&["Boolean"]))
        .statement_input("DO0", Some("do"))
        .previous_statement(None)
        .next_statement(None)
        .tooltip("If a value is true, then do some statements.");
}

fn if_arm_count(block: &Block) -> usize {
    block
        .inputs
        .iter()
        .filter(|i| i.name.starts_with("IF") && i.name != "IF0")
        .count()
}

fn save_if_arms(block: &Block) -> Option<Value> {
    let elseif = if_arm_count(block);
    let has_else = block.get_input("ELSE").is_some();
    if elseif == 0 && !has_else {
        return None;
    }
    Some(json!({ "elseif": elseif, "else": has_else }))
}

/// Rebuild the else-if and else arms. Blocks plugged into dropped arms
/// become roots.
fn load_if_arms(workspace: &mut Workspace, id: BlockId, mutation: &Value) -> Result<()> {
    let invalid = |reason: &str| BlockError::InvalidMutation {
        block: id,
        reason: reason.to_string(),
    };
    let elseif = match mutation.get("elseif") {
        Some(count) => count.as_u64().ok_or_else(|| invalid("elseif must be a count"))?,
        None => 0,
    };
    let has_else = match mutation.get("else") {
        Some(flag) => flag.as_bool().ok_or_else(|| invalid("else must be a boolean"))?,
        None => false,
    };

    let extra: Vec<String> = workspace
        .block(id)?
        .inputs
        .iter()
        .map(|i| i.name.clone())
        .filter(|name| name != "IF0" && name != "DO0")
        .collect();
    for name in extra {
        workspace.remove_input(id, &name)?;
    }

    for arm in 1..=elseif {
        workspace.append_input(
            id,
            InputSpec::value(format!("IF{arm}"), Some("else if"), check(&["Boolean"])),
        )?;
        workspace.append_input(id, InputSpec::statement(format!("DO{arm}"), Some("do")))?;
    }
    if has_else {
        workspace.append_input(id, InputSpec::statement("ELSE", Some("else")))?;
    }
    Ok(())
}

fn controls_for(block: &mut BlockBuilder) {
    block
        .colour(120)
        .input(InputSpec::local_variable("VAR", Some("count with"), "i"))
        .value_input("FROM", Some("from"), check(&["Number"]))
        .value_input("TO", Some("to"), check(&["Number"]))
        .statement_input("DO", Some("do"))
        .previous_statement(None)
        .next_statement(None)
        .inputs_inline(true)
        .tooltip("Count from a start number to an end number.");
}

fn controls_while(block: &mut BlockBuilder) {
    block
        .colour(120)
        .title("repeat")
        .dropdown("MODE", &[("while", "WHILE"), ("until", "UNTIL")])
        .value_input("BOOL", None, check(&["Boolean"]))
        .statement_input("DO", Some("do"))
        .previous_statement(None)
        .next_statement(None)
        .tooltip("Repeat while a value is true, or until it becomes true.");
}

fn wiring_delay(block: &mut BlockBuilder) {
    block
        .colour(120)
        .title("wait ms")
        .value_input("MS", None, check(&["Number"]))
        .previous_statement(None)
        .next_statement(None)
        .inputs_inline(true)
        .tooltip("Pause this thread for some milliseconds.");
}

// ========== Variables ==========

fn variables_get(block: &mut BlockBuilder) {
    block
        .colour(330)
        .text_field("VAR", "item")
        .output(None)
        .tooltip("Returns the value of this variable.");
}

fn variables_set(block: &mut BlockBuilder) {
    block
        .colour(330)
        .title("set")
        .text_field("VAR", "item")
        .value_input("VALUE", Some("to"), None)
        .previous_statement(None)
        .next_statement(None)
        .inputs_inline(true)
        .tooltip("Sets this variable to be equal to the input.");
}

// ========== Procedures ==========

fn procedures_defnoreturn(block: &mut BlockBuilder) {
    block
        .colour(290)
        .title("to")
        .text_field("NAME", "do something")
        .statement_input("STACK", Some("do"))
        .tooltip("A procedure with no return value.");
}

fn procedures_defreturn(block: &mut BlockBuilder) {
    block
        .colour(290)
        .title("to")
        .text_field("NAME", "do something")
        .statement_input("STACK", Some("do"))
        .value_input("RETURN", Some("return"), None)
        .tooltip("A procedure with a return value.");
}

fn procedures_callnoreturn(block: &mut BlockBuilder) {
    block
        .colour(290)
        .title("call")
        .text_field("NAME", "do something")
        .previous_statement(None)
        .next_statement(None)
        .tooltip("Call a procedure with no return value.");
}

fn procedures_callreturn(block: &mut BlockBuilder) {
    block
        .colour(290)
        .title("call")
        .text_field("NAME", "do something")
        .output(None)
        .tooltip("Call a procedure with a return value.");
}

// ========== Wiring ==========

fn led(block: &mut BlockBuilder) {
    block
        .colour(0)
        .title("set led")
        .pin_dropdown("PIN", PinKind::Led)
        .title("to")
        .dropdown("VAL", &[("on", "ON"), ("off", "OFF")])
        .previous_statement(None)
        .next_statement(None)
        .inputs_inline(true)
        .tooltip("Switch a led on or off.");
}

fn output(block: &mut BlockBuilder) {
    block
        .colour(0)
        .title("set pin")
        .pin_dropdown("PIN", PinKind::Output)
        .title("to")
        .dropdown("VAL", &[("high", "HIGH"), ("low", "LOW")])
        .previous_statement(None)
        .next_statement(None)
        .inputs_inline(true)
        .tooltip("Drive an output pin high or low.");
}

fn input(block: &mut BlockBuilder) {
    block
        .colour(120)
        .title("pin")
        .pin_dropdown("PIN", PinKind::Input)
        .title("is")
        .dropdown("VAL", &[("high", "HIGH"), ("low", "LOW")])
        .output(check(&["Boolean"]))
        .tooltip("A pin state.");
}

fn servo(block: &mut BlockBuilder) {
    block
        .colour(0)
        .title("set servo")
        .pin_dropdown("PIN", PinKind::Servo)
        .title("to")
        .value_input("A", None, check(&["Number"]))
        .previous_statement(None)
        .next_statement(None)
        .inputs_inline(true)
        .tooltip("Turn a servo to an angle.");
}

fn optocoupler(block: &mut BlockBuilder) {
    block
        .colour(120)
        .title("optocoupler")
        .pin_dropdown("PIN", PinKind::Optocoupler)
        .title("is")
        .dropdown("VAL", &[("active", "ACTIVE"), ("inactive", "INACTIVE")])
        .output(check(&["Boolean"]))
        .tooltip("A pin state.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::InputKind;
    use assert_matches::assert_matches;

    #[test]
    fn test_every_builtin_instantiates() {
        let registry = BlockRegistry::with_builtins();
        let mut ws = Workspace::new();
        for category in [
            CATEGORY_MATH,
            CATEGORY_LOGIC,
            CATEGORY_CONTROL,
            CATEGORY_VARIABLES,
            CATEGORY_PROCEDURES,
            CATEGORY_WIRING,
        ] {
            for type_tag in registry.types_in_category(category) {
                let id = ws.new_block(type_tag).unwrap();
                assert_eq!(ws.block(id).unwrap().block_type(), type_tag);
            }
        }
        assert_eq!(ws.block_count(), registry.len());
    }

    #[test]
    fn test_pin_dropdown_reads_wiring() {
        let mut ws = Workspace::new();
        let placeholder = ws.new_block("led").unwrap();
        assert_eq!(ws.field_value(placeholder, "PIN").unwrap(), "0");

        ws.wiring_mut().attach(13, "status", PinKind::Led);
        let wired = ws.new_block("led").unwrap();
        assert_eq!(ws.field_value(wired, "PIN").unwrap(), "13");
        assert_eq!(
            ws.block(wired).unwrap().fields()[1].display_text(),
            "status"
        );
    }

    #[test]
    fn test_if_mutation_round_trip() {
        let mut ws = Workspace::new();
        let id = ws.new_block("controls_if").unwrap();
        assert_eq!(ws.mutation_of(id).unwrap(), None);

        ws.apply_mutation(id, &json!({ "elseif": 2, "else": true })).unwrap();
        let names: Vec<&str> = ws.block(id).unwrap().inputs().iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["IF0", "DO0", "IF1", "DO1", "IF2", "DO2", "ELSE"]);
        assert_eq!(ws.mutation_of(id).unwrap(), Some(json!({ "elseif": 2, "else": true })));

        ws.apply_mutation(id, &json!({ "elseif": 0 })).unwrap();
        assert_eq!(ws.block(id).unwrap().inputs().len(), 2);
        assert_eq!(ws.mutation_of(id).unwrap(), None);
    }

    #[test]
    fn test_bad_mutation_is_rejected() {
        let mut ws = Workspace::new();
        let id = ws.new_block("controls_if").unwrap();
        assert_matches!(
            ws.apply_mutation(id, &json!({ "elseif": "many" })),
            Err(BlockError::InvalidMutation { .. })
        );

        let led = ws.new_block("led").unwrap();
        assert_matches!(
            ws.apply_mutation(led, &json!({})),
            Err(BlockError::InvalidMutation { .. })
        );
    }

    #[test]
    fn test_for_loop_local_variable() {
        let mut ws = Workspace::new();
        let id = ws.new_block("controls_for").unwrap();
        assert_eq!(ws.field_value(id, "VAR").unwrap(), "i");
        ws.set_field_value(id, "VAR", "step").unwrap();
        assert_eq!(ws.field_value(id, "VAR").unwrap(), "step");
        assert_eq!(ws.block(id).unwrap().inputs()[0].kind(), InputKind::LocalVariable);
    }
}
