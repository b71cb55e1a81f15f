use crate::pipeline::LibraryId;
use chumsky::input::{Input as _, ValueInput};
use chumsky::pratt::*;
use chumsky::prelude::*;
use std::collections::BTreeSet;
use std::rc::Rc;

mod lexer;
pub use lexer::{Token, lexer};

mod preprocessor;
pub use preprocessor::{Manifest, ManifestValue, PreprocessorError, preprocess};

pub type Span = SimpleSpan;
pub type ParseError<'code, T> = Rich<'code, T, Span>;

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Library {
        path: String,
    },
    Print {
        values: Vec<Spanned<Expression>>,
    },
    Assign {
        target: AssignTarget,
        value: Spanned<Expression>,
    },
    Expression(Spanned<Expression>),
    If {
        branches: Vec<ConditionalBranch>,
        otherwise: Option<Vec<Spanned<Statement>>>,
    },
    Function(Rc<FunctionDeclaration>),
    Return {
        value: Option<Spanned<Expression>>,
    },
    Component(ComponentDeclaration),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Variable(String),
    Member {
        object: Spanned<Expression>,
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalBranch {
    pub condition: Spanned<Expression>,
    pub body: Vec<Spanned<Statement>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    pub name: String,
    pub parameters: Vec<String>,
    pub body: Vec<Spanned<Statement>>,
    pub is_sub: bool,
}

/// `component "Name" extends "Base" ... end component`
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDeclaration {
    pub name: String,
    pub extends: Option<String>,
    pub fields: Vec<FieldDeclaration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDeclaration {
    pub name: String,
    pub value: Spanned<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    Identifier(String),
    Array {
        items: Vec<Spanned<Expression>>,
    },
    AssociativeArray {
        entries: Vec<(String, Spanned<Expression>)>,
    },
    Call {
        callee: Box<Spanned<Expression>>,
        arguments: Vec<Spanned<Expression>>,
    },
    Member {
        object: Box<Spanned<Expression>>,
        name: String,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Spanned<Expression>>,
        right: Box<Spanned<Expression>>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Spanned<Expression>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negate,
}

enum Postfix {
    Call(Vec<Spanned<Expression>>),
    Member(String),
}

fn binary(
    operator: BinaryOperator,
    left: Spanned<Expression>,
    right: Spanned<Expression>,
    span: Span,
) -> Spanned<Expression> {
    Spanned {
        node: Expression::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    }
}

fn unary(operator: UnaryOperator, operand: Spanned<Expression>, span: Span) -> Spanned<Expression> {
    Spanned {
        node: Expression::Unary {
            operator,
            operand: Box::new(operand),
        },
        span,
    }
}

fn expression<'tokens, I>()
-> impl Parser<'tokens, I, Spanned<Expression>, extra::Err<ParseError<'tokens, Token>>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    recursive(|expression| {
        let newlines = just(Token::Newline).repeated();
        let identifier = select! { Token::Identifier(name) => name };

        let literal = select! {
            Token::Integer(value) => Literal::Integer(value),
            Token::Float(value) => Literal::Float(value),
            Token::Text(text) => Literal::Text(text),
            Token::True => Literal::Boolean(true),
            Token::False => Literal::Boolean(false),
            Token::Invalid => Literal::Invalid,
        }
        .map(Expression::Literal);

        let array = expression
            .clone()
            .separated_by(just(Token::Comma).padded_by(newlines.clone()))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(
                just(Token::BracketSquareOpen).then(newlines.clone()),
                newlines.clone().then(just(Token::BracketSquareClose)),
            )
            .map(|items| Expression::Array { items });

        let entry_key = choice((identifier.clone(), select! { Token::Text(key) => key }));
        let entry_separator = choice((
            just(Token::Comma).then(newlines.clone()).ignored(),
            newlines.clone().at_least(1).ignored(),
        ));
        let associative_array = entry_key
            .then_ignore(just(Token::Colon))
            .then(expression.clone())
            .separated_by(entry_separator)
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(
                just(Token::BracketCurlyOpen).then(newlines.clone()),
                newlines.clone().then(just(Token::BracketCurlyClose)),
            )
            .map(|entries| Expression::AssociativeArray { entries });

        let atom = choice((
            literal,
            identifier.clone().map(Expression::Identifier),
            array,
            associative_array,
        ))
        .map_with(|node, extra| Spanned {
            node,
            span: extra.span(),
        })
        .or(expression.clone().delimited_by(
            just(Token::BracketRoundOpen),
            just(Token::BracketRoundClose),
        ));

        let arguments = expression
            .clone()
            .separated_by(just(Token::Comma))
            .collect::<Vec<_>>()
            .delimited_by(
                just(Token::BracketRoundOpen),
                just(Token::BracketRoundClose),
            )
            .map(Postfix::Call);

        let member = just(Token::Dot)
            .ignore_then(identifier)
            .map(Postfix::Member);

        let postfix_chain = atom.foldl_with(
            choice((arguments, member)).repeated(),
            |object, postfix, extra| {
                let node = match postfix {
                    Postfix::Call(arguments) => Expression::Call {
                        callee: Box::new(object),
                        arguments,
                    },
                    Postfix::Member(name) => Expression::Member {
                        object: Box::new(object),
                        name,
                    },
                };
                Spanned {
                    node,
                    span: extra.span(),
                }
            },
        );

        let comparison = select! {
            Token::Equal => BinaryOperator::Equal,
            Token::NotEqual => BinaryOperator::NotEqual,
            Token::Less => BinaryOperator::Less,
            Token::LessOrEqual => BinaryOperator::LessOrEqual,
            Token::Greater => BinaryOperator::Greater,
            Token::GreaterOrEqual => BinaryOperator::GreaterOrEqual,
        };
        let additive = select! {
            Token::Plus => BinaryOperator::Add,
            Token::Minus => BinaryOperator::Subtract,
        };
        let multiplicative = select! {
            Token::Asterisk => BinaryOperator::Multiply,
            Token::Slash => BinaryOperator::Divide,
        };

        postfix_chain.pratt((
            infix(left(1), just(Token::Or), |l, _, r, extra| {
                binary(BinaryOperator::Or, l, r, extra.span())
            }),
            infix(left(2), just(Token::And), |l, _, r, extra| {
                binary(BinaryOperator::And, l, r, extra.span())
            }),
            prefix(3, just(Token::Not), |_, operand, extra| {
                unary(UnaryOperator::Not, operand, extra.span())
            }),
            infix(left(4), comparison, |l, operator, r, extra| {
                binary(operator, l, r, extra.span())
            }),
            infix(left(5), additive, |l, operator, r, extra| {
                binary(operator, l, r, extra.span())
            }),
            infix(left(6), multiplicative, |l, operator, r, extra| {
                binary(operator, l, r, extra.span())
            }),
            prefix(7, just(Token::Minus), |_, operand, extra| {
                unary(UnaryOperator::Negate, operand, extra.span())
            }),
        ))
    })
}

pub fn parser<'tokens, I>()
-> impl Parser<'tokens, I, Vec<Spanned<Statement>>, extra::Err<ParseError<'tokens, Token>>>
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    let expression = expression();
    let separator = choice((just(Token::Newline), just(Token::Colon)))
        .repeated()
        .at_least(1)
        .ignored();

    let statement = recursive(|statement| {
        let identifier = select! { Token::Identifier(name) => name };
        let text = select! { Token::Text(text) => text };

        // Header is followed by a line break, every inner statement too.
        let block = separator.clone().ignore_then(
            statement
                .clone()
                .then_ignore(separator.clone())
                .repeated()
                .collect::<Vec<_>>(),
        );

        let library = just(Token::Library).ignore_then(text.clone()).try_map(|path: String, span| {
            if LibraryId::from_path(&path).is_some() {
                Ok(Statement::Library { path })
            } else {
                Err(ParseError::custom(span, format!("Unknown library '{path}'")))
            }
        });

        let print = just(Token::Print)
            .ignore_then(
                expression.clone()
                    .separated_by(choice((just(Token::Comma), just(Token::Semicolon))))
                    .allow_trailing()
                    .collect::<Vec<_>>(),
            )
            .map(|values| Statement::Print { values });

        let else_if = choice((
            just(Token::ElseIf).ignored(),
            just(Token::Else).then(just(Token::If)).ignored(),
        ))
        .ignore_then(expression.clone())
        .then_ignore(just(Token::Then).or_not())
        .then(block.clone())
        .map(|(condition, body)| ConditionalBranch { condition, body });

        let if_statement = just(Token::If)
            .ignore_then(expression.clone())
            .then_ignore(just(Token::Then).or_not())
            .then(block.clone())
            .map(|(condition, body)| ConditionalBranch { condition, body })
            .then(else_if.repeated().collect::<Vec<_>>())
            .then(just(Token::Else).ignore_then(block.clone()).or_not())
            .then_ignore(choice((
                just(Token::End).then(just(Token::If)).ignored(),
                just(Token::EndIf).ignored(),
            )))
            .map(|((first, rest), otherwise)| {
                let mut branches = vec![first];
                branches.extend(rest);
                Statement::If {
                    branches,
                    otherwise,
                }
            });

        // `as <type>` annotations are accepted and ignored
        let type_annotation = select! { Token::Identifier(word) if word.eq_ignore_ascii_case("as") => () }
            .then(choice((
                select! { Token::Identifier(_) => () },
                just(Token::Function).ignored(),
                just(Token::Invalid).ignored(),
            )))
            .ignored();

        let parameters = identifier
            .clone()
            .then_ignore(type_annotation.clone().or_not())
            .separated_by(just(Token::Comma))
            .collect::<Vec<_>>()
            .delimited_by(
                just(Token::BracketRoundOpen),
                just(Token::BracketRoundClose),
            );

        let function = choice((
            just(Token::Function).to(false),
            just(Token::Sub).to(true),
        ))
        .then(identifier.clone())
        .then(parameters)
        .then_ignore(type_annotation.or_not())
        .then(block.clone())
        .then_ignore(just(Token::End))
        .then_ignore(choice((just(Token::Function), just(Token::Sub))))
        .map(|(((is_sub, name), parameters), body)| {
            Statement::Function(Rc::new(FunctionDeclaration {
                name,
                parameters,
                body,
                is_sub,
            }))
        });

        let return_statement = just(Token::Return)
            .ignore_then(expression.clone().or_not())
            .map(|value| Statement::Return { value });

        let field = just(Token::Field)
            .ignore_then(identifier.clone())
            .then_ignore(just(Token::Equal))
            .then(expression.clone())
            .map(|(name, value)| FieldDeclaration { name, value });

        let component = just(Token::Component)
            .ignore_then(text.clone())
            .then(just(Token::Extends).ignore_then(text).or_not())
            .then_ignore(separator.clone())
            .then(
                field
                    .then_ignore(separator.clone())
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .then_ignore(just(Token::End))
            .then_ignore(just(Token::Component))
            .map(|((name, extends), fields)| {
                Statement::Component(ComponentDeclaration {
                    name,
                    extends,
                    fields,
                })
            });

        // `a.b.c = value` assigns member `c` of `a.b`
        let assign_target = identifier
            .clone()
            .map_with(|name, extra| (name, extra.span()))
            .then(
                just(Token::Dot)
                    .ignore_then(identifier.clone().map_with(|name, extra| (name, extra.span())))
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|((root, root_span), mut path): ((String, Span), Vec<(String, Span)>)| {
                match path.pop() {
                    None => AssignTarget::Variable(root),
                    Some((name, _)) => {
                        let root = Spanned {
                            node: Expression::Identifier(root),
                            span: root_span,
                        };
                        let object = path.into_iter().fold(root, |object, (member, span)| Spanned {
                            span: Span::from(object.span.start..span.end),
                            node: Expression::Member {
                                object: Box::new(object),
                                name: member,
                            },
                        });
                        AssignTarget::Member { object, name }
                    }
                }
            });

        let assign = assign_target
            .then_ignore(just(Token::Equal))
            .then(expression.clone())
            .map(|(target, value)| Statement::Assign { target, value });

        choice((
            library,
            print,
            if_statement,
            function,
            return_statement,
            component,
            assign,
            expression.clone().map(Statement::Expression),
        ))
        .map_with(|node, extra| Spanned {
            node,
            span: extra.span(),
        })
        .boxed()
    });

    separator.clone().or_not().ignore_then(
        statement
            .then_ignore(separator.or(end()))
            .repeated()
            .collect(),
    )
}

/// Parsed form of one unit: statements plus the libraries its top-level
/// `Library` statements ask for.
#[derive(Debug, Default)]
pub struct ParsedUnit {
    pub statements: Vec<Spanned<Statement>>,
    pub libraries: BTreeSet<LibraryId>,
}

pub fn parse_tokens(
    tokens: &[Spanned<Token>],
) -> Result<ParsedUnit, Vec<ParseError<'_, Token>>> {
    let eoi = tokens
        .last()
        .map(|token| Span::from(token.span.end..token.span.end))
        .unwrap_or_else(|| Span::from(0..0));
    let input = tokens.map(eoi, |Spanned { node, span }| (node, span));
    let statements = parser().parse(input).into_result()?;
    let libraries = library_requests(&statements);
    Ok(ParsedUnit {
        statements,
        libraries,
    })
}

pub fn library_requests(statements: &[Spanned<Statement>]) -> BTreeSet<LibraryId> {
    statements
        .iter()
        .filter_map(|statement| match &statement.node {
            Statement::Library { path } => LibraryId::from_path(path),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(code: &str) -> Result<ParsedUnit, Vec<String>> {
        let mut tokens = lexer().parse(code).into_output().unwrap();
        tokens.retain(|token| token.node != Token::Comment);
        parse_tokens(&tokens).map_err(|errors| errors.iter().map(|e| e.to_string()).collect())
    }

    fn statements(code: &str) -> Vec<Statement> {
        parse(code)
            .unwrap()
            .statements
            .into_iter()
            .map(|statement| statement.node)
            .collect()
    }

    #[test]
    fn assignment_and_comparison_are_distinguished() {
        let parsed = statements("x = 1\nprint x = 1");
        assert!(matches!(
            &parsed[0],
            Statement::Assign { target: AssignTarget::Variable(name), .. } if name == "x"
        ));
        let Statement::Print { values } = &parsed[1] else {
            panic!("expected print");
        };
        assert!(matches!(
            values[0].node,
            Expression::Binary {
                operator: BinaryOperator::Equal,
                ..
            }
        ));
    }

    #[test]
    fn precedence() {
        let parsed = statements("1 + 2 * 3");
        let Statement::Expression(expression) = &parsed[0] else {
            panic!("expected expression");
        };
        let Expression::Binary {
            operator, right, ..
        } = &expression.node
        else {
            panic!("expected binary");
        };
        assert_eq!(*operator, BinaryOperator::Add);
        assert!(matches!(
            right.node,
            Expression::Binary {
                operator: BinaryOperator::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn member_assignment() {
        let parsed = statements("m.top.title = \"x\"");
        let Statement::Assign {
            target: AssignTarget::Member { object, name },
            ..
        } = &parsed[0]
        else {
            panic!("expected member assignment");
        };
        assert_eq!(name, "title");
        assert!(matches!(&object.node, Expression::Member { name, .. } if name == "top"));
    }

    #[test]
    fn if_else_chain() {
        let parsed = statements(
            "if a then\n  print 1\nelse if b\n  print 2\nelse\n  print 3\nend if",
        );
        let Statement::If {
            branches,
            otherwise,
        } = &parsed[0]
        else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(otherwise.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn functions_and_calls() {
        let parsed = statements(
            "function Add(a, b)\n  return a + b\nend function\nsub Main()\n  print Add(1, 2)\nend sub",
        );
        let Statement::Function(add) = &parsed[0] else {
            panic!("expected function");
        };
        assert_eq!(add.parameters, vec!["a".to_string(), "b".to_string()]);
        assert!(!add.is_sub);
        let Statement::Function(main) = &parsed[1] else {
            panic!("expected sub");
        };
        assert!(main.is_sub);
        assert_eq!(main.body.len(), 1);
    }

    #[test]
    fn literals_across_lines() {
        let parsed = statements("x = {\n  name: \"a\"\n  \"count\": 2,\n}\ny = [1, 2,\n 3]");
        let Statement::Assign { value, .. } = &parsed[0] else {
            panic!("expected assign");
        };
        assert!(matches!(
            &value.node,
            Expression::AssociativeArray { entries } if entries.len() == 2
        ));
        let Statement::Assign { value, .. } = &parsed[1] else {
            panic!("expected assign");
        };
        assert!(matches!(&value.node, Expression::Array { items } if items.len() == 3));
    }

    #[test]
    fn type_annotations_are_ignored() {
        let parsed = statements("function Greet(name as string, times as integer) as object\n  return name\nend function");
        let Statement::Function(greet) = &parsed[0] else {
            panic!("expected function");
        };
        assert_eq!(greet.parameters, vec!["name".to_string(), "times".to_string()]);
    }

    #[test]
    fn component_declaration() {
        let parsed = statements(
            "component \"Badge\" extends \"Label\"\n  field text = \"new\"\n  field count = 3\nend component",
        );
        let Statement::Component(declaration) = &parsed[0] else {
            panic!("expected component");
        };
        assert_eq!(declaration.name, "Badge");
        assert_eq!(declaration.extends.as_deref(), Some("Label"));
        assert_eq!(declaration.fields.len(), 2);
    }

    #[test]
    fn library_statements_report_requests() {
        let parsed = parse("Library \"v30/bslDefender.brs\"\nLibrary \"Roku_Ads.brs\"").unwrap();
        assert_eq!(
            parsed.libraries.into_iter().collect::<Vec<_>>(),
            vec![LibraryId::Defender, LibraryId::Ads]
        );
    }

    #[test]
    fn unknown_library_is_a_parse_error() {
        let errors = parse("Library \"v30/bslMystery.brs\"").unwrap_err();
        assert!(errors.iter().any(|error| error.contains("Unknown library")));
    }

    #[test]
    fn malformed_statement_is_a_parse_error() {
        assert!(parse("x = (1 +").is_err());
    }

    #[test]
    fn empty_input_has_no_statements() {
        assert!(parse("").unwrap().statements.is_empty());
        assert!(parse("\n\n' only a comment\n").unwrap().statements.is_empty());
    }
}
