//! Tree-walking evaluator for the parsed statement tree.

use super::{ComponentRef, ExecutionContext, FatalRunError, Interpreter, Value};
use crate::components::collections::{RoArray, RoAssociativeArray};
use crate::components::node::NodeKindDefinition;
use crate::components::registry::{ComponentRegistry, CreationContext};
use crate::components::string::leading_number;
use crate::components::{self, Component};
use crate::parser::{
    AssignTarget, BinaryOperator, ComponentDeclaration, Expression, FunctionDeclaration, Literal,
    Span, Spanned, Statement, UnaryOperator,
};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

const MAX_CALL_DEPTH: usize = 128;

/// Entry points tried in order after the top-level statements ran.
const ENTRY_POINTS: [&str; 2] = ["main", "runuserinterface"];

type RunResult<T> = Result<T, FatalRunError>;
type Values = SmallVec<[Value; 4]>;

/// The reference [`Interpreter`].
pub struct Evaluator<'r> {
    registry: &'r ComponentRegistry,
}

impl<'r> Evaluator<'r> {
    pub fn new(registry: &'r ComponentRegistry) -> Self {
        Self { registry }
    }
}

impl Default for Evaluator<'static> {
    fn default() -> Self {
        Self::new(ComponentRegistry::global())
    }
}

impl Interpreter for Evaluator<'_> {
    fn exec(
        &mut self,
        statements: &[Spanned<Statement>],
        scope: ComponentRef,
        context: &mut ExecutionContext,
    ) -> Result<Vec<Value>, FatalRunError> {
        let mut machine = Machine {
            registry: self.registry,
            context,
            scope,
            functions: HashMap::new(),
            frames: vec![Frame::default()],
            temporaries: Vec::new(),
            results: Vec::with_capacity(statements.len() + 1),
        };
        machine.run(statements)?;
        Ok(machine.results)
    }
}

enum Flow {
    Normal,
    Return(Value),
}

#[derive(Default)]
struct Frame {
    variables: HashMap<String, Value>,
}

struct Machine<'r, 'c> {
    registry: &'r ComponentRegistry,
    context: &'c mut ExecutionContext,
    scope: ComponentRef,
    functions: HashMap<String, Rc<FunctionDeclaration>>,
    frames: Vec<Frame>,
    // Values computed but not yet stored anywhere, kept alive across collections
    temporaries: Vec<Value>,
    results: Vec<Value>,
}

impl Machine<'_, '_> {
    fn run(&mut self, statements: &[Spanned<Statement>]) -> RunResult<()> {
        for statement in statements {
            if let Statement::Function(function) = &statement.node {
                self.declare_function(function);
            }
        }

        for statement in statements {
            let value = match &statement.node {
                Statement::Expression(expression) => self.evaluate(expression)?,
                _ => match self.execute(statement)? {
                    Flow::Normal => Value::Invalid,
                    Flow::Return(value) => {
                        self.results.push(value);
                        return Ok(());
                    }
                },
            };
            self.results.push(value);
            self.collect_if_needed();
        }

        let entry = ENTRY_POINTS
            .iter()
            .find_map(|name| self.functions.get(*name).cloned());
        if let Some(function) = entry {
            log::debug!("Calling entry point '{}'", function.name);
            let arguments: Values = match function.parameters.len() {
                0 => Values::new(),
                1 => smallvec::smallvec![Value::Object(self.scope)],
                _ => {
                    return Err(FatalRunError::Runtime {
                        message: format!(
                            "Entry point '{}' takes at most one parameter",
                            function.name
                        ),
                        span: None,
                    });
                }
            };
            let value = self.call_function(&function, arguments, None)?;
            self.results.push(value);
        }
        Ok(())
    }

    fn declare_function(&mut self, function: &Rc<FunctionDeclaration>) {
        self.functions
            .insert(function.name.to_ascii_lowercase(), Rc::clone(function));
    }

    fn collect_if_needed(&mut self) {
        if !self.context.heap.should_collect() {
            return;
        }
        let mut roots: Vec<ComponentRef> = vec![self.scope];
        roots.extend(
            self.frames
                .iter()
                .flat_map(|frame| frame.variables.values())
                .chain(&self.temporaries)
                .chain(&self.results)
                .filter_map(Value::as_object),
        );
        roots.extend(self.context.catalog.references());
        self.context.heap.collect(roots);
    }

    fn frame(&mut self) -> &mut Frame {
        if self.frames.is_empty() {
            self.frames.push(Frame::default());
        }
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn execute_block(&mut self, statements: &[Spanned<Statement>]) -> RunResult<Flow> {
        for statement in statements {
            if let Flow::Return(value) = self.execute(statement)? {
                return Ok(Flow::Return(value));
            }
            self.collect_if_needed();
        }
        Ok(Flow::Normal)
    }

    fn execute(&mut self, statement: &Spanned<Statement>) -> RunResult<Flow> {
        match &statement.node {
            // Linked in by the loader
            Statement::Library { .. } => {}
            Statement::Print { values } => {
                let values = self.evaluate_all(values)?;
                let line = values
                    .iter()
                    .map(|value| self.display(value))
                    .collect::<Vec<_>>()
                    .join(" ");
                self.context.print(&line);
            }
            Statement::Assign { target, value } => {
                let value = self.evaluate(value)?;
                self.assign(target, value, statement.span)?;
            }
            Statement::Expression(expression) => {
                self.evaluate(expression)?;
            }
            Statement::If {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    if self.condition(&branch.condition)? {
                        return self.execute_block(&branch.body);
                    }
                }
                if let Some(otherwise) = otherwise {
                    return self.execute_block(otherwise);
                }
            }
            Statement::Function(function) => self.declare_function(function),
            Statement::Return { value } => {
                let value = match value {
                    Some(value) => self.evaluate(value)?,
                    None => Value::Invalid,
                };
                return Ok(Flow::Return(value));
            }
            Statement::Component(declaration) => self.declare_component(declaration)?,
        }
        Ok(Flow::Normal)
    }

    fn assign(&mut self, target: &AssignTarget, value: Value, span: Span) -> RunResult<()> {
        match target {
            AssignTarget::Variable(name) => {
                self.frame()
                    .variables
                    .insert(name.to_ascii_lowercase(), value);
            }
            AssignTarget::Member { object, name } => {
                let (value, object) = self.holding(value, |machine| machine.evaluate(object))?;
                let object = self.expect_object(object, name, span)?;
                components::set_member(&mut self.context.heap, object, name, value)
                    .map_err(|error| FatalRunError::runtime(error.to_string(), span))?;
            }
        }
        Ok(())
    }

    fn declare_component(&mut self, declaration: &ComponentDeclaration) -> RunResult<()> {
        let mut fields = Vec::with_capacity(declaration.fields.len());
        for field in &declaration.fields {
            let value = self.evaluate(&field.value)?;
            self.temporaries.push(value.clone());
            fields.push((field.name.clone(), value));
        }
        let pinned = self.temporaries.len() - fields.len();
        self.temporaries.truncate(pinned);

        let replaced = self.context.catalog.declare(NodeKindDefinition {
            name: declaration.name.clone(),
            extends: declaration.extends.clone(),
            fields,
        });
        if replaced.is_some() {
            log::debug!("Node kind '{}' redeclared", declaration.name);
        } else {
            log::debug!("Node kind '{}' declared", declaration.name);
        }
        Ok(())
    }

    fn condition(&mut self, condition: &Spanned<Expression>) -> RunResult<bool> {
        match self.evaluate(condition)? {
            Value::Boolean(value) => Ok(value),
            other => Err(FatalRunError::runtime(
                format!("Type Mismatch. Condition must be Boolean, found {}", other.type_name()),
                condition.span,
            )),
        }
    }

    /// Keeps `value` rooted while `then` runs, and hands it back.
    fn holding<T>(
        &mut self,
        value: Value,
        then: impl FnOnce(&mut Self) -> RunResult<T>,
    ) -> RunResult<(Value, T)> {
        self.temporaries.push(value);
        let result = then(self);
        let value = self.temporaries.pop().unwrap_or(Value::Invalid);
        result.map(|result| (value, result))
    }

    fn evaluate_all<'e>(
        &mut self,
        expressions: impl IntoIterator<Item = &'e Spanned<Expression>>,
    ) -> RunResult<Values> {
        let base = self.temporaries.len();
        for expression in expressions {
            match self.evaluate(expression) {
                Ok(value) => self.temporaries.push(value),
                Err(error) => {
                    self.temporaries.truncate(base);
                    return Err(error);
                }
            }
        }
        Ok(self.temporaries.drain(base..).collect())
    }

    fn evaluate(&mut self, expression: &Spanned<Expression>) -> RunResult<Value> {
        let span = expression.span;
        match &expression.node {
            Expression::Literal(literal) => Ok(match literal {
                Literal::Boolean(value) => Value::Boolean(*value),
                Literal::Integer(value) => Value::Integer(*value),
                Literal::Float(value) => Value::Float(*value),
                Literal::Text(text) => Value::String(text.clone()),
                Literal::Invalid => Value::Invalid,
            }),
            Expression::Identifier(name) => self.variable(name, span),
            Expression::Array { items } => {
                let items = self.evaluate_all(items)?;
                let array = RoArray::from(items.into_vec());
                Ok(Value::Object(self.context.heap.alloc(Component::Array(array))))
            }
            Expression::AssociativeArray { entries } => {
                let values = self.evaluate_all(entries.iter().map(|(_, value)| value))?;
                let mut aa = RoAssociativeArray::new();
                for ((key, _), value) in entries.iter().zip(values) {
                    aa.insert(key, value);
                }
                Ok(Value::Object(
                    self.context.heap.alloc(Component::AssociativeArray(aa)),
                ))
            }
            Expression::Call { callee, arguments } => match &callee.node {
                Expression::Identifier(name) => {
                    let arguments = self.evaluate_all(arguments)?;
                    self.call_named(name, arguments, span)
                }
                Expression::Member { object, name } => {
                    let receiver = self.evaluate(object)?;
                    let (receiver, arguments) =
                        self.holding(receiver, |machine| machine.evaluate_all(arguments))?;
                    let receiver = self.expect_object(receiver, name, span)?;
                    components::call_method(
                        &mut self.context.heap,
                        &self.context.catalog,
                        receiver,
                        name,
                        &arguments,
                    )
                    .map_err(|error| FatalRunError::runtime(error.to_string(), span))
                }
                _ => Err(FatalRunError::runtime(
                    "Only named functions and methods can be called",
                    span,
                )),
            },
            Expression::Member { object, name } => {
                let object = self.evaluate(object)?;
                let object = self.expect_object(object, name, span)?;
                components::get_member(&self.context.heap, object, name)
                    .map_err(|error| FatalRunError::runtime(error.to_string(), span))
            }
            Expression::Binary {
                operator: operator @ (BinaryOperator::And | BinaryOperator::Or),
                left,
                right,
            } => {
                let left_value = self.condition(left)?;
                match (operator, left_value) {
                    (BinaryOperator::And, false) => Ok(Value::Boolean(false)),
                    (BinaryOperator::Or, true) => Ok(Value::Boolean(true)),
                    _ => Ok(Value::Boolean(self.condition(right)?)),
                }
            }
            Expression::Binary {
                operator,
                left,
                right,
            } => {
                let left = self.evaluate(left)?;
                let (left, right) = self.holding(left, |machine| machine.evaluate(right))?;
                binary(*operator, left, right, span)
            }
            Expression::Unary { operator, operand } => {
                match (operator, self.evaluate(operand)?) {
                    (UnaryOperator::Not, Value::Boolean(value)) => Ok(Value::Boolean(!value)),
                    (UnaryOperator::Negate, Value::Integer(value)) => {
                        Ok(Value::Integer(value.wrapping_neg()))
                    }
                    (UnaryOperator::Negate, Value::Float(value)) => Ok(Value::Float(-value)),
                    (operator, value) => Err(FatalRunError::runtime(
                        format!(
                            "Type Mismatch. Operator \"{}\" can't be applied to \"{}\"",
                            match operator {
                                UnaryOperator::Not => "not",
                                UnaryOperator::Negate => "-",
                            },
                            value.type_name()
                        ),
                        span,
                    )),
                }
            }
        }
    }

    fn variable(&mut self, name: &str, span: Span) -> RunResult<Value> {
        let key = name.to_ascii_lowercase();
        if let Some(value) = self.frame().variables.get(&key) {
            return Ok(value.clone());
        }
        if self.functions.contains_key(&key) {
            return Err(FatalRunError::runtime(
                format!("Function '{name}' cannot be used as a value"),
                span,
            ));
        }
        Err(FatalRunError::runtime(
            format!("Use of uninitialized variable '{name}'"),
            span,
        ))
    }

    fn expect_object(&self, value: Value, member: &str, span: Span) -> RunResult<ComponentRef> {
        match value {
            Value::Object(object) => Ok(object),
            other => Err(FatalRunError::runtime(
                format!("'{}' has no member '{member}'", other.type_name()),
                span,
            )),
        }
    }

    fn call_named(&mut self, name: &str, arguments: Values, span: Span) -> RunResult<Value> {
        let key = name.to_ascii_lowercase();
        if let Some(value) = self.call_global(&key, name, &arguments, span)? {
            return Ok(value);
        }
        match self.functions.get(&key).cloned() {
            Some(function) => self.call_function(&function, arguments, Some(span)),
            None => Err(FatalRunError::runtime(
                format!("Function '{name}' is not defined"),
                span,
            )),
        }
    }

    fn call_function(
        &mut self,
        function: &FunctionDeclaration,
        arguments: Values,
        span: Option<Span>,
    ) -> RunResult<Value> {
        let fail = |message: String| FatalRunError::Runtime { message, span };
        if self.frames.len() > MAX_CALL_DEPTH {
            return Err(fail(format!(
                "Stack overflow while calling '{}'",
                function.name
            )));
        }
        if arguments.len() != function.parameters.len() {
            return Err(fail(format!(
                "'{}' expects {} argument(s), found {}",
                function.name,
                function.parameters.len(),
                arguments.len()
            )));
        }

        let variables = function
            .parameters
            .iter()
            .map(|parameter| parameter.to_ascii_lowercase())
            .zip(arguments)
            .collect();
        self.frames.push(Frame { variables });
        let flow = self.execute_block(&function.body);
        self.frames.pop();
        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Invalid),
        }
    }

    /// Built-in global functions. `None` when `key` names none of them.
    fn call_global(
        &mut self,
        key: &str,
        name: &str,
        arguments: &[Value],
        span: Span,
    ) -> RunResult<Option<Value>> {
        let arity = |expected: usize| {
            if arguments.len() == expected {
                Ok(())
            } else {
                Err(FatalRunError::runtime(
                    format!(
                        "{name}() expects {expected} argument(s), found {}",
                        arguments.len()
                    ),
                    span,
                ))
            }
        };
        let text = |position: usize| match arguments.get(position) {
            Some(Value::String(text)) => Ok(text.as_str()),
            other => Err(FatalRunError::runtime(
                format!(
                    "{name}() argument {} must be String, found {}",
                    position + 1,
                    other.map(Value::type_name).unwrap_or("nothing")
                ),
                span,
            )),
        };

        let value = match key {
            "createobject" => {
                let kind = text(0)?;
                let cx = CreationContext {
                    catalog: &self.context.catalog,
                };
                match self.registry.create(kind, &arguments[1..], &cx) {
                    Ok(component) => Value::Object(self.context.heap.alloc(component)),
                    Err(failure) => {
                        log::debug!("CreateObject(\"{kind}\") returned invalid: {failure}");
                        Value::Invalid
                    }
                }
            }
            "type" => {
                arity(1)?;
                match &arguments[0] {
                    Value::Object(object) => match self.context.heap.get(*object) {
                        Some(component) => Value::from(component.kind_name()),
                        None => Value::from("<released>"),
                    },
                    value => Value::from(value.type_name()),
                }
            }
            "ucase" => {
                arity(1)?;
                Value::String(text(0)?.to_uppercase())
            }
            "lcase" => {
                arity(1)?;
                Value::String(text(0)?.to_lowercase())
            }
            "len" => {
                arity(1)?;
                Value::Integer(text(0)?.chars().count() as i64)
            }
            "str" => {
                arity(1)?;
                match &arguments[0] {
                    value @ (Value::Integer(_) | Value::Float(_)) => {
                        let formatted = value.to_string();
                        if formatted.starts_with('-') {
                            Value::String(formatted)
                        } else {
                            Value::String(format!(" {formatted}"))
                        }
                    }
                    other => {
                        return Err(FatalRunError::runtime(
                            format!("{name}() argument 1 must be numeric, found {}", other.type_name()),
                            span,
                        ));
                    }
                }
            }
            "val" => {
                arity(1)?;
                let number = leading_number(text(0)?);
                if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
                    Value::Integer(number as i64)
                } else {
                    Value::Float(number)
                }
            }
            "readasciifile" => {
                arity(1)?;
                let path = text(0)?;
                match self.context.device.file_system.read_text(path) {
                    Ok(contents) => Value::String(contents),
                    Err(error) => {
                        log::debug!("ReadAsciiFile(\"{path}\") failed: {error}");
                        Value::String(String::new())
                    }
                }
            }
            "writeasciifile" => {
                arity(2)?;
                let path = text(0)?;
                let contents = text(1)?;
                match self.context.device.file_system.write_text(path, contents) {
                    Ok(()) => Value::Boolean(true),
                    Err(error) => {
                        log::debug!("WriteAsciiFile(\"{path}\") failed: {error}");
                        Value::Boolean(false)
                    }
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    fn display(&self, value: &Value) -> String {
        match value {
            Value::Object(object) => match self.context.heap.get(*object) {
                Some(Component::String(string)) => string.as_str().to_string(),
                Some(component) => format!("<Component: {}>", component.kind_name()),
                None => "<Component: released>".to_string(),
            },
            value => value.to_string(),
        }
    }
}

fn operator_symbol(operator: BinaryOperator) -> &'static str {
    match operator {
        BinaryOperator::Or => "or",
        BinaryOperator::And => "and",
        BinaryOperator::Equal => "=",
        BinaryOperator::NotEqual => "<>",
        BinaryOperator::Less => "<",
        BinaryOperator::LessOrEqual => "<=",
        BinaryOperator::Greater => ">",
        BinaryOperator::GreaterOrEqual => ">=",
        BinaryOperator::Add => "+",
        BinaryOperator::Subtract => "-",
        BinaryOperator::Multiply => "*",
        BinaryOperator::Divide => "/",
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(value) => Some(*value as f64),
        Value::Float(value) => Some(*value),
        _ => None,
    }
}

fn binary(operator: BinaryOperator, left: Value, right: Value, span: Span) -> RunResult<Value> {
    use BinaryOperator::*;
    let mismatch = |left: &Value, right: &Value| {
        FatalRunError::runtime(
            format!(
                "Type Mismatch. Operator \"{}\" can't be applied to \"{}\" and \"{}\"",
                operator_symbol(operator),
                left.type_name(),
                right.type_name()
            ),
            span,
        )
    };

    match operator {
        Equal | NotEqual | Less | LessOrEqual | Greater | GreaterOrEqual => {
            let equality = matches!(operator, Equal | NotEqual);
            let ordering = match (&left, &right) {
                (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                (Value::Boolean(a), Value::Boolean(b)) if equality => Some(a.cmp(b)),
                (Value::Object(a), Value::Object(b)) if equality => {
                    (a == b).then_some(Ordering::Equal)
                }
                (Value::Invalid, Value::Invalid) if equality => Some(Ordering::Equal),
                (Value::Invalid, _) | (_, Value::Invalid) if equality => None,
                (a, b) => match (number(a), number(b)) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => return Err(mismatch(&left, &right)),
                },
            };
            let result = match operator {
                Equal => ordering == Some(Ordering::Equal),
                NotEqual => ordering != Some(Ordering::Equal),
                Less => ordering == Some(Ordering::Less),
                LessOrEqual => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                Greater => ordering == Some(Ordering::Greater),
                _ => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            };
            Ok(Value::Boolean(result))
        }
        Add | Subtract | Multiply | Divide => match (&left, &right) {
            (Value::String(a), Value::String(b)) if operator == Add => {
                if a.len() + b.len() > components::MAX_STRING_BYTES {
                    return Err(FatalRunError::runtime(
                        format!(
                            "String too long: concatenation exceeds {} bytes",
                            components::MAX_STRING_BYTES
                        ),
                        span,
                    ));
                }
                Ok(Value::String(format!("{a}{b}")))
            }
            (Value::Integer(a), Value::Integer(b)) => match operator {
                Add => Ok(Value::Integer(a.wrapping_add(*b))),
                Subtract => Ok(Value::Integer(a.wrapping_sub(*b))),
                Multiply => Ok(Value::Integer(a.wrapping_mul(*b))),
                _ if *b == 0 => Err(FatalRunError::runtime("Divide by Zero", span)),
                _ => Ok(Value::Float(*a as f64 / *b as f64)),
            },
            (a, b) => match (number(a), number(b)) {
                (Some(a), Some(b)) => Ok(Value::Float(match operator {
                    Add => a + b,
                    Subtract => a - b,
                    Multiply => a * b,
                    _ => a / b,
                })),
                _ => Err(mismatch(&left, &right)),
            },
        },
        // Short-circuited by the caller
        And | Or => Err(mismatch(&left, &right)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::DeviceContext;
    use crate::parser::{Token, lexer, parse_tokens};
    use crate::runtime::CapturedOutput;
    use chumsky::Parser as _;

    fn run(source: &str) -> (RunResult<Vec<Value>>, ExecutionContext, Vec<String>) {
        let mut tokens = lexer().parse(source).into_result().unwrap();
        tokens.retain(|token| token.node != Token::Comment);
        let unit = parse_tokens(&tokens).unwrap();
        let output = CapturedOutput::new();
        let mut context = ExecutionContext::new(DeviceContext::default(), Box::new(output.clone()));
        let scope = context
            .heap
            .alloc(Component::AssociativeArray(RoAssociativeArray::new()));
        let result = Evaluator::default().exec(&unit.statements, scope, &mut context);
        (result, context, output.lines())
    }

    fn results(source: &str) -> Vec<Value> {
        run(source).0.unwrap()
    }

    fn fatal(source: &str) -> String {
        run(source).0.unwrap_err().to_string()
    }

    #[test]
    fn one_result_per_top_level_statement() {
        assert_eq!(
            results("1 + 2\nx = 4\nx * 2.5\n"),
            vec![Value::Integer(3), Value::Invalid, Value::Float(10.0)]
        );
    }

    #[test]
    fn main_runs_last_and_receives_the_scope() {
        let source = r#"
function Main(args)
    args.visited = true
    return args.visited
end function
"#;
        assert_eq!(results(source), vec![Value::Invalid, Value::Boolean(true)]);
    }

    #[test]
    fn functions_are_hoisted() {
        let source = "double(21)\nfunction double(n)\n return n * 2\nend function\n";
        assert_eq!(results(source)[0], Value::Integer(42));
    }

    #[test]
    fn print_goes_to_the_output_sink() {
        let (_, _, lines) = run("print \"a\", 1, true\nprint invalid\n");
        assert_eq!(lines, vec!["a 1 true", "invalid"]);
    }

    #[test]
    fn if_chains() {
        let source = r#"
function pick(n)
    if n < 0 then
        return "negative"
    else if n = 0 then
        return "zero"
    else
        return "positive"
    end if
end function
pick(-1)
pick(0)
pick(3)
"#;
        assert_eq!(
            results(source)[1..],
            [Value::from("negative"), Value::from("zero"), Value::from("positive")]
        );
    }

    #[test]
    fn globals() {
        assert_eq!(
            results("UCase(\"ab\")\nLen(\"abc\")\nStr(5)\nVal(\"12\")\nType(1.5)\n"),
            vec![
                Value::from("AB"),
                Value::Integer(3),
                Value::from(" 5"),
                Value::Integer(12),
                Value::from("Float"),
            ]
        );
    }

    #[test]
    fn create_object_failures_become_invalid() {
        let source = r#"CreateObject("roNothing")
CreateObject("roList", 1)
CreateObject("roRegex", "a", 1)
CreateObject("roRegex", "(open", "")
CreateObject("roSGNode", "NoSuchNode")
CreateObject("roList", 1) = invalid
"#;
        assert_eq!(
            results(source),
            vec![
                Value::Invalid,
                Value::Invalid,
                Value::Invalid,
                Value::Invalid,
                Value::Invalid,
                Value::Boolean(true),
            ]
        );
    }

    #[test]
    fn runaway_growth_is_fatal() {
        let array = "a = CreateObject(\"roArray\", 0, true)\na.SetEntry(100000000000, 1)\n";
        assert!(fatal(array).starts_with("setentry() failed"));

        let doubling = r#"
function grow(text, times)
    if times = 0
        return text
    end if
    return grow(text + text, times - 1)
end function
grow("ab", 40)
"#;
        assert!(fatal(doubling).starts_with("String too long"));
    }

    #[test]
    fn cyclic_xml_bodies_are_fatal() {
        let source = r#"
a = CreateObject("roXMLElement")
b = CreateObject("roXMLElement")
c = CreateObject("roXMLElement")
a.SetName("a")
b.SetName("b")
c.SetName("c")
toB = CreateObject("roXMLList")
toB.Push(b)
toA = CreateObject("roXMLList")
toA.Push(a)
a.SetBody(toB)
b.SetBody(toA)
c.SetBody(toA)
c.GenXML(false)
"#;
        assert!(fatal(source).starts_with("genxml() failed"));
    }

    #[test]
    fn component_methods_are_dispatched() {
        let source = r#"
list = CreateObject("roArray")
list.Push(3)
list.push(4)
list.Count()
"#;
        assert_eq!(results(source)[3], Value::Integer(2));
    }

    #[test]
    fn declared_components_extend_node_creation() {
        let source = r#"
component "Badge" extends "Label"
    field tone = "loud"
end component
badge = CreateObject("roSGNode", "Badge")
badge.tone
badge.IsSubtype("Label")
"#;
        let values = results(source);
        assert_eq!(values[2], Value::from("loud"));
        assert_eq!(values[3], Value::Boolean(true));
    }

    #[test]
    fn runtime_errors_are_fatal() {
        assert_eq!(fatal("y = x + 1\n"), "Use of uninitialized variable 'x'");
        assert_eq!(fatal("nope()\n"), "Function 'nope' is not defined");
        assert_eq!(
            fatal("\"a\" + 1\n"),
            "Type Mismatch. Operator \"+\" can't be applied to \"String\" and \"Integer\""
        );
        assert_eq!(fatal("x = invalid\nx.title\n"), "'Invalid' has no member 'title'");
        assert_eq!(
            fatal("a = CreateObject(\"roArray\")\na.fly()\n"),
            "'roArray' has no method 'fly'"
        );
        assert_eq!(fatal("1 / 0\n"), "Divide by Zero");
    }

    #[test]
    fn unbounded_recursion_is_fatal() {
        let source = "function f(n)\n return f(n + 1)\nend function\nf(0)\n";
        assert!(fatal(source).starts_with("Stack overflow"));
    }

    #[test]
    fn logic_short_circuits() {
        assert_eq!(
            results("false and missing()\ntrue or missing()\nnot false\n"),
            vec![Value::Boolean(false), Value::Boolean(true), Value::Boolean(true)]
        );
    }

    #[test]
    fn ascii_files_round_trip_through_the_device() {
        let source = "WriteAsciiFile(\"tmp:/note.txt\", \"hi\")\nReadAsciiFile(\"tmp:/note.txt\")\n";
        assert_eq!(
            results(source),
            vec![Value::Boolean(true), Value::from("hi")]
        );
    }
}
