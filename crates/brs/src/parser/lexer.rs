use super::{ParseError, Spanned};
use chumsky::prelude::*;
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    BracketRoundOpen,
    BracketRoundClose,
    BracketSquareOpen,
    BracketSquareClose,
    BracketCurlyOpen,
    BracketCurlyClose,
    Comment,
    Integer(i64),
    Float(f64),
    Text(String),
    Identifier(String),
    // `#if`, `#const`, ... lowercased, without the `#`
    Directive(String),
    Colon,
    Semicolon,
    Comma,
    Dot,
    Newline,
    NotEqual,
    GreaterOrEqual,
    Greater,
    LessOrEqual,
    Less,
    Equal,
    Minus,
    Plus,
    Asterisk,
    Slash,
    True,
    False,
    Invalid,
    And,
    Or,
    Not,
    If,
    Then,
    Else,
    ElseIf,
    EndIf,
    End,
    Function,
    Sub,
    Return,
    Print,
    Library,
    Component,
    Extends,
    Field,
}

impl Token {
    pub fn into_cow_str(self) -> Cow<'static, str> {
        match self {
            Self::BracketRoundOpen => "(".into(),
            Self::BracketRoundClose => ")".into(),
            Self::BracketSquareOpen => "[".into(),
            Self::BracketSquareClose => "]".into(),
            Self::BracketCurlyOpen => "{".into(),
            Self::BracketCurlyClose => "}".into(),
            Self::Comment => "'".into(),
            Self::Integer(number) => number.to_string().into(),
            Self::Float(number) => number.to_string().into(),
            Self::Text(text) => format!("\"{text}\"").into(),
            Self::Identifier(identifier) => identifier.into(),
            Self::Directive(directive) => format!("#{directive}").into(),
            Self::Colon => ":".into(),
            Self::Semicolon => ";".into(),
            Self::Comma => ",".into(),
            Self::Dot => ".".into(),
            Self::Newline => "\n".into(),
            Self::NotEqual => "<>".into(),
            Self::GreaterOrEqual => ">=".into(),
            Self::Greater => ">".into(),
            Self::LessOrEqual => "<=".into(),
            Self::Less => "<".into(),
            Self::Equal => "=".into(),
            Self::Minus => "-".into(),
            Self::Plus => "+".into(),
            Self::Asterisk => "*".into(),
            Self::Slash => "/".into(),
            Self::True => "true".into(),
            Self::False => "false".into(),
            Self::Invalid => "invalid".into(),
            Self::And => "and".into(),
            Self::Or => "or".into(),
            Self::Not => "not".into(),
            Self::If => "if".into(),
            Self::Then => "then".into(),
            Self::Else => "else".into(),
            Self::ElseIf => "elseif".into(),
            Self::EndIf => "endif".into(),
            Self::End => "end".into(),
            Self::Function => "function".into(),
            Self::Sub => "sub".into(),
            Self::Return => "return".into(),
            Self::Print => "print".into(),
            Self::Library => "library".into(),
            Self::Component => "component".into(),
            Self::Extends => "extends".into(),
            Self::Field => "field".into(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.clone().into_cow_str())
    }
}

/// Keywords are case-insensitive; anything else stays an identifier with its
/// original spelling.
fn keyword_or_identifier(word: &str) -> Token {
    match word.to_ascii_lowercase().as_str() {
        "true" => Token::True,
        "false" => Token::False,
        "invalid" => Token::Invalid,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "if" => Token::If,
        "then" => Token::Then,
        "else" => Token::Else,
        "elseif" => Token::ElseIf,
        "endif" => Token::EndIf,
        "end" => Token::End,
        "function" => Token::Function,
        "sub" => Token::Sub,
        "return" => Token::Return,
        "print" => Token::Print,
        "library" => Token::Library,
        "component" => Token::Component,
        "extends" => Token::Extends,
        "field" => Token::Field,
        _ => Token::Identifier(word.to_string()),
    }
}

pub fn lexer<'code>()
-> impl Parser<'code, &'code str, Vec<Spanned<Token>>, extra::Err<ParseError<'code, char>>> {
    let bracket = choice((
        just('(').to(Token::BracketRoundOpen),
        just(')').to(Token::BracketRoundClose),
        just('[').to(Token::BracketSquareOpen),
        just(']').to(Token::BracketSquareClose),
        just('{').to(Token::BracketCurlyOpen),
        just('}').to(Token::BracketCurlyClose),
    ));

    let comparator = choice((
        just("<>").to(Token::NotEqual),
        just(">=").to(Token::GreaterOrEqual),
        just('>').to(Token::Greater),
        just("<=").to(Token::LessOrEqual),
        just('<').to(Token::Less),
        just('=').to(Token::Equal),
    ));

    let arithmetic_operator = choice((
        just('-').to(Token::Minus),
        just('+').to(Token::Plus),
        just('*').to(Token::Asterisk),
        just('/').to(Token::Slash),
    ));

    let word_character = any().filter(|character: &char| {
        character.is_ascii_alphanumeric() || *character == '_'
    });

    let apostrophe_comment = just('\'')
        .then(none_of("\r\n").repeated())
        .to(Token::Comment);

    let rem_comment = one_of("rR")
        .then(one_of("eE"))
        .then(one_of("mM"))
        .then(word_character.not())
        .then(none_of("\r\n").repeated())
        .to(Token::Comment);

    let directive = just('#')
        .ignore_then(text::ascii::ident())
        .map(|directive: &str| Token::Directive(directive.to_ascii_lowercase()));

    let hex_integer = just('&')
        .then(one_of("hH"))
        .ignore_then(text::digits(16).to_slice())
        .try_map(|digits: &str, span| {
            i64::from_str_radix(digits, 16)
                .map(Token::Integer)
                .map_err(|error| ParseError::custom(span, format!("Invalid hex literal: {error}")))
        });

    let float = text::int(10)
        .then(just('.').then(text::digits(10)))
        .to_slice()
        .from_str()
        .unwrapped()
        .map(Token::Float);

    let integer = text::int(10).to_slice().try_map(|digits: &str, span| {
        digits
            .parse::<i64>()
            .map(Token::Integer)
            .map_err(|error| ParseError::custom(span, format!("Invalid integer literal: {error}")))
    });

    // `""` inside a string literal is an escaped quote
    let string_literal = just('"')
        .ignore_then(
            choice((just("\"\"").to('"'), none_of("\"\r\n")))
                .repeated()
                .collect::<String>(),
        )
        .then_ignore(just('"'))
        .map(Token::Text);

    // Identifiers may carry a type designator suffix (`name$`, `count%`)
    let word = text::ascii::ident()
        .then(one_of("$%!#&").or_not())
        .to_slice()
        .map(keyword_or_identifier);

    let token = choice((
        apostrophe_comment,
        rem_comment,
        directive,
        bracket,
        hex_integer,
        float,
        integer,
        string_literal,
        word,
        just(':').to(Token::Colon),
        just(';').to(Token::Semicolon),
        just(',').to(Token::Comma),
        just('.').to(Token::Dot),
        text::newline().to(Token::Newline),
        comparator,
        arithmetic_operator,
    ));

    token
        .map_with(|token, extra| Spanned {
            node: token,
            span: extra.span(),
        })
        .padded_by(text::inline_whitespace())
        .recover_with(skip_then_retry_until(any().ignored(), end()))
        .repeated()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chumsky::prelude::Parser;

    fn tokens(code: &str) -> Vec<Token> {
        lexer()
            .parse(code)
            .into_output()
            .unwrap()
            .into_iter()
            .map(|token| token.node)
            .collect()
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            tokens("IF x Then PRINT"),
            vec![
                Token::If,
                Token::Identifier("x".to_string()),
                Token::Then,
                Token::Print,
            ]
        );
    }

    #[test]
    fn identifiers_keep_their_spelling_and_suffix() {
        assert_eq!(tokens("myName$"), vec![Token::Identifier("myName$".to_string())]);
    }

    #[test]
    fn string_literals_unescape_doubled_quotes() {
        assert_eq!(
            tokens(r#""say ""hi""""#),
            vec![Token::Text("say \"hi\"".to_string())]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            tokens("42 3.5 &hFF"),
            vec![Token::Integer(42), Token::Float(3.5), Token::Integer(255)]
        );
    }

    #[test]
    fn comments_run_to_end_of_line() {
        assert_eq!(
            tokens("x ' note\nREM another\nremaining"),
            vec![
                Token::Identifier("x".to_string()),
                Token::Comment,
                Token::Newline,
                Token::Comment,
                Token::Newline,
                Token::Identifier("remaining".to_string()),
            ]
        );
    }

    #[test]
    fn directives_are_lowercased() {
        assert_eq!(
            tokens("#IF debug"),
            vec![
                Token::Directive("if".to_string()),
                Token::Identifier("debug".to_string()),
            ]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let (_, errors) = lexer().parse("x = \"open").into_output_errors();
        assert!(!errors.is_empty());
    }
}
