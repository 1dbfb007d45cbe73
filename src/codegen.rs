//! C code generation for AVR wiring programs.
//!
//! Every statement stack on the workspace becomes a cooperative thread, loose
//! value blocks become expression statements and procedure definitions are
//! collected ahead of the code. The output is spliced into a firmware
//! template that calls `init()` and then runs `thread_0()`.

use crate::block::InputKind;
use crate::error::{BlockError, Result};
use crate::names::{declared_type, NameDb, NameType};
use crate::{BlockId, Workspace};
use tracing::debug;

/// Stack bytes reserved for every thread after the first
pub const THREAD_STACK_SIZE: usize = 80;

const INDENT: &str = "  ";

/// What a block turned into
enum Generated {
    /// Statement code, newline-terminated
    Statement(String),
    /// Expression and whether it is atomic (safe to embed without parens)
    Value(String, bool),
    /// The block stored its own output as a definition
    Definition,
}

pub struct CGenerator<'a> {
    workspace: &'a Workspace,
    names: NameDb,
    definitions: Vec<String>,
    threads: Vec<String>,
}

impl<'a> CGenerator<'a> {
    pub fn new(workspace: &'a Workspace) -> Self {
        Self {
            workspace,
            names: NameDb::for_c(),
            definitions: Vec::new(),
            threads: Vec::new(),
        }
    }

    /// Generate the program for every top block, ordered top to bottom
    pub fn workspace_to_code(workspace: &Workspace) -> Result<String> {
        CGenerator::new(workspace).generate()
    }

    pub fn generate(mut self) -> Result<String> {
        self.init();

        let mut code = String::new();
        for root in self.workspace.top_blocks(true) {
            match self.block_to_code(root)? {
                Generated::Definition => {}
                Generated::Value(line, _) => {
                    let line = self.scrub(root, line)?;
                    code.push_str(&line);
                    code.push_str(";\n");
                }
                Generated::Statement(body) => {
                    let body = self.scrub(root, body)?;
                    code.push_str(&self.thread_start());
                    code.push_str(&body);
                    code.push_str(" for(;;)avr_thread_sleep(1000);\n}\n\n");
                }
            }
        }

        debug!(threads = self.threads.len(), "generated program");
        Ok(self.finish(code))
    }

    /// Declare every variable up front, typed by its `_type_` prefix
    fn init(&mut self) {
        self.definitions.clear();
        self.threads.clear();
        self.names.reset();

        let declarations: String = self
            .workspace
            .all_variables()
            .iter()
            .map(|variable| {
                let name = self.names.get_name(variable, NameType::Variable);
                format!("{} {};\n", declared_type(variable), name)
            })
            .collect();
        if !declarations.is_empty() {
            self.definitions.push(declarations);
        }
    }

    fn finish(&mut self, code: String) -> String {
        let (plain, returning) = self.workspace.all_procedures();
        let mut out = String::new();

        for name in &plain {
            let name = self.names.get_name(name, NameType::Procedure);
            out.push_str(&format!("void {name}();\n"));
        }
        for name in &returning {
            let c_name = self.names.get_name(name, NameType::Procedure);
            out.push_str(&format!("{} {c_name}();\n", declared_type(&c_name)));
        }
        if !out.is_empty() {
            out.push('\n');
        }

        for definition in &self.definitions {
            out.push_str(definition);
            out.push('\n');
        }
        out.push_str(&code);

        out.push_str("void init(){\n");
        for pin in self.workspace.wiring().pins() {
            let mode = if pin.kind.is_output() { "OUTPUT" } else { "INPUT" };
            out.push_str(&format!("pinMode({}, {mode});\n", pin.pin));
        }
        for thread in self.threads.iter().skip(1) {
            out.push_str(&format!(
                " avr_thread_start(&{thread}_context, {thread}, {thread}_stack, sizeof({thread}_stack));\n"
            ));
        }
        out.push_str("}\n");

        if self.threads.is_empty() {
            out.push_str("void thread_0(){for(;;);}\n");
        }
        out
    }

    /// Open the next thread function; every thread but the first needs its
    /// own stack and context
    fn thread_start(&mut self) -> String {
        let thread = format!("thread_{}", self.threads.len());
        let header = if self.threads.is_empty() {
            format!("void {thread}(){{\n")
        } else {
            format!(
                "uint8_t {thread}_stack[{THREAD_STACK_SIZE}];\navr_thread_context {thread}_context;\nvoid {thread}(){{\n"
            )
        };
        self.threads.push(thread);
        header
    }

    /// Prepend the comments of a statement (and of the values plugged into
    /// it) and append the code of the blocks below
    fn scrub(&mut self, id: BlockId, code: String) -> Result<String> {
        let workspace = self.workspace;
        let block = workspace.block(id)?;
        let mut comments = String::new();

        let plugged_in = match block.output {
            Some(output) => workspace.connection(output)?.is_connected(),
            None => false,
        };
        if !plugged_in {
            if let Some(comment) = block.comment() {
                comments.push_str(&prefix_lines(comment, "// "));
                comments.push('\n');
            }
            for input in block.inputs().iter().filter(|i| i.kind() == InputKind::Value) {
                let Some(connection) = input.connection() else {
                    continue;
                };
                if let Some(child) = workspace.target_block(connection)? {
                    let nested = self.nested_comments(child)?;
                    if !nested.is_empty() {
                        comments.push_str(&prefix_lines(&nested, "// "));
                    }
                }
            }
        }

        let next = match workspace.next_block(id)? {
            Some(below) => self.stack_to_code(below)?,
            None => String::new(),
        };
        Ok(comments + &code + &next)
    }

    /// Comments of a block and everything below it, one per line
    fn nested_comments(&self, id: BlockId) -> Result<String> {
        let mut lines = Vec::new();
        for block in self.workspace.descendants(id)? {
            if let Some(comment) = self.workspace.block(block)?.comment() {
                lines.push(comment.to_string());
            }
        }
        if lines.is_empty() {
            return Ok(String::new());
        }
        lines.push(String::new());
        Ok(lines.join("\n"))
    }

    /// Code of a statement block and all blocks chained below it
    fn stack_to_code(&mut self, id: BlockId) -> Result<String> {
        match self.block_to_code(id)? {
            Generated::Statement(code) => self.scrub(id, code),
            Generated::Value(code, _) => self.scrub(id, code),
            Generated::Definition => Ok(String::new()),
        }
    }

    /// Indented code of the stack plugged into a statement input
    fn statement_to_code(&mut self, id: BlockId, name: &str) -> Result<String> {
        match self.workspace.input_target_block(id, name)? {
            Some(child) => {
                let code = self.stack_to_code(child)?;
                Ok(prefix_lines(&code, INDENT))
            }
            None => Ok(String::new()),
        }
    }

    /// Expression plugged into a value input, parenthesised when `atomic`
    /// is asked for and the expression is not. None when the input is empty.
    fn value_to_code(&mut self, id: BlockId, name: &str, atomic: bool) -> Result<Option<String>> {
        let Some(child) = self.workspace.input_target_block(id, name)? else {
            return Ok(None);
        };
        match self.block_to_code(child)? {
            Generated::Value(code, is_atomic) if atomic && !is_atomic => Ok(Some(format!("({code})"))),
            Generated::Value(code, _) => Ok(Some(code)),
            Generated::Statement(_) | Generated::Definition => Err(BlockError::InvalidMutation {
                block: child,
                reason: format!("statement block plugged into value input '{name}'"),
            }),
        }
    }

    fn value_or_zero(&mut self, id: BlockId, name: &str, atomic: bool) -> Result<String> {
        Ok(self
            .value_to_code(id, name, atomic)?
            .unwrap_or_else(|| "0".to_string()))
    }

    fn field(&self, id: BlockId, name: &str) -> Result<String> {
        Ok(self.workspace.field_value(id, name)?.to_string())
    }

    // ========== Block Generators ==========

    fn block_to_code(&mut self, id: BlockId) -> Result<Generated> {
        let block_type = self.workspace.block(id)?.block_type().to_string();
        let generated = match block_type.as_str() {
            "math_number" => {
                let number = self.field(id, "NUM")?;
                let number = if number.trim().is_empty() { "0".to_string() } else { number };
                let atomic = !number.starts_with('-');
                Generated::Value(number, atomic)
            }
            "math_arithmetic" => {
                let operator = match self.field(id, "OP")?.as_str() {
                    "MINUS" => "-",
                    "MULTIPLY" => "*",
                    "DIVIDE" => "/",
                    _ => "+",
                };
                let a = self.value_or_zero(id, "A", true)?;
                let b = self.value_or_zero(id, "B", true)?;
                Generated::Value(format!("{a} {operator} {b}"), false)
            }
            "logic_boolean" => {
                let value = if self.field(id, "BOOL")? == "TRUE" { "1" } else { "0" };
                Generated::Value(value.to_string(), true)
            }
            "logic_compare" => {
                let operator = match self.field(id, "OP")?.as_str() {
                    "NEQ" => "!=",
                    "LT" => "<",
                    "LTE" => "<=",
                    "GT" => ">",
                    "GTE" => ">=",
                    _ => "==",
                };
                let a = self.value_or_zero(id, "A", true)?;
                let b = self.value_or_zero(id, "B", true)?;
                Generated::Value(format!("{a} {operator} {b}"), false)
            }
            "controls_if" => Generated::Statement(self.controls_if(id)?),
            "controls_for" => {
                let variable = self.field(id, "VAR")?;
                let variable = self.names.get_name(&variable, NameType::Variable);
                let from = self.value_or_zero(id, "FROM", false)?;
                let to = self.value_or_zero(id, "TO", true)?;
                let branch = self.statement_to_code(id, "DO")?;
                Generated::Statement(format!(
                    "for ({variable} = {from}; {variable} <= {to}; {variable}++) {{\n{branch}}}\n"
                ))
            }
            "controls_while" => {
                let until = self.field(id, "MODE")? == "UNTIL";
                let condition = if until {
                    format!("!{}", self.value_or_zero(id, "BOOL", true)?)
                } else {
                    self.value_or_zero(id, "BOOL", false)?
                };
                let branch = self.statement_to_code(id, "DO")?;
                Generated::Statement(format!("while ({condition}) {{\n{branch}}}\n"))
            }
            "wiring_delay" => {
                let ms = self.value_or_zero(id, "MS", false)?;
                Generated::Statement(format!("avr_thread_sleep({ms});\n"))
            }
            "variables_get" => {
                let variable = self.field(id, "VAR")?;
                Generated::Value(self.names.get_name(&variable, NameType::Variable), true)
            }
            "variables_set" => {
                let variable = self.field(id, "VAR")?;
                let variable = self.names.get_name(&variable, NameType::Variable);
                let value = self.value_or_zero(id, "VALUE", false)?;
                Generated::Statement(format!("{variable} = {value};\n"))
            }
            "procedures_defreturn" | "procedures_defnoreturn" => {
                let name = self.field(id, "NAME")?;
                let name = self.names.get_name(&name, NameType::Procedure);
                let branch = self.statement_to_code(id, "STACK")?;
                let code = if block_type == "procedures_defreturn" {
                    let returned = match self.value_to_code(id, "RETURN", true)? {
                        Some(value) => format!("  return {value};\n"),
                        None => String::new(),
                    };
                    format!("{} {name}() {{\n{branch}{returned}}}\n", declared_type(&name))
                } else {
                    format!("void {name}() {{\n{branch}}}\n")
                };
                let code = self.scrub(id, code)?;
                self.definitions.push(code);
                Generated::Definition
            }
            "procedures_callreturn" => {
                let name = self.field(id, "NAME")?;
                Generated::Value(format!("{}()", self.names.get_name(&name, NameType::Procedure)), true)
            }
            "procedures_callnoreturn" => {
                let name = self.field(id, "NAME")?;
                Generated::Statement(format!("{}();\n", self.names.get_name(&name, NameType::Procedure)))
            }
            "led" => {
                let pin = self.field(id, "PIN")?;
                let level = if self.field(id, "VAL")? == "ON" { "HIGH" } else { "LOW" };
                Generated::Statement(format!("digitalWrite({pin}, {level});\n"))
            }
            "output" => {
                let pin = self.field(id, "PIN")?;
                let level = self.field(id, "VAL")?;
                Generated::Statement(format!("digitalWrite({pin}, {level});\n"))
            }
            "input" => {
                let pin = self.field(id, "PIN")?;
                let level = self.field(id, "VAL")?;
                Generated::Value(format!("digitalRead({pin}) == {level}"), false)
            }
            "servo" => {
                let pin = self.field(id, "PIN")?;
                let angle = self.value_or_zero(id, "A", false)?;
                Generated::Statement(format!("set_servo({pin}, {angle});\n"))
            }
            "optocoupler" => {
                let pin = self.field(id, "PIN")?;
                let level = if self.field(id, "VAL")? == "ACTIVE" { "HIGH" } else { "LOW" };
                Generated::Value(format!("digitalRead({pin}) == {level}"), false)
            }
            other => return Err(BlockError::UnknownBlockType(other.to_string())),
        };
        Ok(generated)
    }

    fn controls_if(&mut self, id: BlockId) -> Result<String> {
        let arms: Vec<String> = self
            .workspace
            .block(id)?
            .inputs()
            .iter()
            .filter(|i| i.name().starts_with("IF"))
            .map(|i| i.name()[2..].to_string())
            .collect();

        let mut code = String::new();
        for (n, arm) in arms.iter().enumerate() {
            let condition = self.value_or_zero(id, &format!("IF{arm}"), false)?;
            let branch = self.statement_to_code(id, &format!("DO{arm}"))?;
            if n > 0 {
                code.push_str(" else ");
            }
            code.push_str(&format!("if ({condition}) {{\n{branch}}}"));
        }
        if self.workspace.block(id)?.get_input("ELSE").is_some() {
            let branch = self.statement_to_code(id, "ELSE")?;
            code.push_str(&format!(" else {{\n{branch}}}"));
        }
        code.push('\n');
        Ok(code)
    }
}

/// Prefix every line of `text` that has content
fn prefix_lines(text: &str, prefix: &str) -> String {
    text.split_inclusive('\n')
        .map(|line| {
            if line == "\n" {
                line.to_string()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect()
}
