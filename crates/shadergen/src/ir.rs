//! A deliberately small GLSL syntax tree.
//!
//! The generator never concatenates shader text directly; it assembles a
//! [`Module`], runs [`Module::validate`], and only then renders source with
//! [`Module::to_glsl`]. Scalar expressions can also be evaluated on the CPU.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::format::float_literal;
use crate::GenerateError;

/// GLSL builtins the generator is allowed to call.
const BUILTINS: &[&str] = &[
    "abs",
    "clamp",
    "cos",
    "dot",
    "float",
    "floor",
    "fwidth",
    "int",
    "max",
    "min",
    "mix",
    "normalize",
    "pow",
    "sin",
    "smoothstep",
    "sqrt",
    "vec2",
    "vec3",
    "vec4",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ty {
    Void,
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
}

impl Ty {
    pub fn glsl(self) -> &'static str {
        match self {
            Ty::Void => "void",
            Ty::Int => "int",
            Ty::Float => "float",
            Ty::Vec2 => "vec2",
            Ty::Vec3 => "vec3",
            Ty::Vec4 => "vec4",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Float(f64),
    Int(i64),
    Ident(Cow<'static, str>),
    Field(Box<Expr>, &'static str),
    Call(&'static str, Vec<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

pub fn float(value: f64) -> Expr {
    Expr::Float(value)
}

pub fn int(value: i64) -> Expr {
    Expr::Int(value)
}

pub fn ident(name: &'static str) -> Expr {
    Expr::Ident(Cow::Borrowed(name))
}

pub fn call(name: &'static str, args: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Call(name, args.into_iter().collect())
}

pub fn vec3(rgb: [f64; 3]) -> Expr {
    call("vec3", rgb.map(float))
}

impl Expr {
    pub fn field(self, name: &'static str) -> Expr {
        Expr::Field(Box::new(self), name)
    }

    fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn lt(self, rhs: Expr) -> Expr {
        Self::binary(BinOp::Lt, self, rhs)
    }

    pub fn gt(self, rhs: Expr) -> Expr {
        Self::binary(BinOp::Gt, self, rhs)
    }

    /// Evaluates a scalar expression. Identifiers are resolved through `env`;
    /// vector constructors, swizzles and unknown calls yield `None`.
    pub fn eval(&self, env: &dyn Fn(&str) -> Option<f64>) -> Option<f64> {
        match self {
            Expr::Float(value) => Some(*value),
            Expr::Int(value) => Some(*value as f64),
            Expr::Ident(name) => env(name),
            Expr::Field(..) => None,
            Expr::Neg(inner) => inner.eval(env).map(|value| -value),
            Expr::Binary(op, lhs, rhs) => {
                let (a, b) = (lhs.eval(env)?, rhs.eval(env)?);
                let flag = |condition: bool| if condition { 1.0 } else { 0.0 };
                Some(match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Lt => flag(a < b),
                    BinOp::Gt => flag(a > b),
                })
            }
            Expr::Call(name, args) => {
                let values = args
                    .iter()
                    .map(|arg| arg.eval(env))
                    .collect::<Option<Vec<_>>>()?;
                match (*name, values.as_slice()) {
                    ("sin", [x]) => Some(x.sin()),
                    ("cos", [x]) => Some(x.cos()),
                    ("abs", [x]) => Some(x.abs()),
                    ("floor", [x]) => Some(x.floor()),
                    ("sqrt", [x]) => Some(x.sqrt()),
                    ("float", [x]) => Some(*x),
                    ("min", [a, b]) => Some(a.min(*b)),
                    ("max", [a, b]) => Some(a.max(*b)),
                    ("pow", [a, b]) => Some(a.powf(*b)),
                    ("clamp", [x, lo, hi]) => Some(x.max(*lo).min(*hi)),
                    ("mix", [a, b, t]) => Some(a + (b - a) * t),
                    ("smoothstep", [e0, e1, x]) => {
                        let t = ((x - e0) / (e1 - e0)).clamp(0.0, 1.0);
                        Some(t * t * (3.0 - 2.0 * t))
                    }
                    _ => None,
                }
            }
        }
    }

    fn render(&self, out: &mut String) {
        match self {
            Expr::Float(value) => {
                if *value < 0.0 {
                    let _ = write!(out, "({})", float_literal(*value));
                } else {
                    out.push_str(&float_literal(*value));
                }
            }
            Expr::Int(value) => {
                if *value < 0 {
                    let _ = write!(out, "({value})");
                } else {
                    let _ = write!(out, "{value}");
                }
            }
            Expr::Ident(name) => out.push_str(name),
            Expr::Field(inner, name) => {
                inner.render(out);
                out.push('.');
                out.push_str(name);
            }
            Expr::Call(name, args) => {
                out.push_str(name);
                out.push('(');
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    arg.render(out);
                }
                out.push(')');
            }
            Expr::Neg(inner) => {
                out.push_str("-(");
                inner.render(out);
                out.push(')');
            }
            Expr::Binary(op, lhs, rhs) => {
                out.push('(');
                lhs.render(out);
                let _ = write!(out, " {} ", op.symbol());
                rhs.render(out);
                out.push(')');
            }
        }
    }

    fn check(&self, scope: &Scope<'_>, function: &str) -> Result<(), GenerateError> {
        match self {
            Expr::Float(value) => {
                // Shader floats are 32-bit; anything wider compiles to infinity.
                if value.is_finite() && value.abs() <= f32::MAX as f64 {
                    Ok(())
                } else {
                    Err(GenerateError::NonFiniteLiteral {
                        function: function.to_string(),
                    })
                }
            }
            Expr::Int(_) => Ok(()),
            Expr::Ident(name) => scope.require(name, function),
            Expr::Field(inner, _) | Expr::Neg(inner) => inner.check(scope, function),
            Expr::Binary(_, lhs, rhs) => {
                lhs.check(scope, function)?;
                rhs.check(scope, function)
            }
            Expr::Call(name, args) => {
                if !BUILTINS.contains(name) && !scope.functions.contains(name) {
                    return Err(GenerateError::UnknownFunction {
                        name: name.to_string(),
                        function: function.to_string(),
                    });
                }
                args.iter().try_for_each(|arg| arg.check(scope, function))
            }
        }
    }
}

macro_rules! impl_arith {
    ($trait:ident, $method:ident, $op:ident) => {
        impl $trait for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary(BinOp::$op, self, rhs)
            }
        }
    };
}

impl_arith!(Add, add, Add);
impl_arith!(Sub, sub, Sub);
impl_arith!(Mul, mul, Mul);
impl_arith!(Div, div, Div);

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Comment(&'static str),
    Let {
        ty: Ty,
        name: &'static str,
        value: Expr,
    },
    Assign {
        target: &'static str,
        value: Expr,
    },
    If {
        condition: Expr,
        then: Vec<Stmt>,
    },
    Return(Option<Expr>),
}

impl Stmt {
    pub fn let_(ty: Ty, name: &'static str, value: Expr) -> Stmt {
        Stmt::Let { ty, name, value }
    }

    pub fn assign(target: &'static str, value: Expr) -> Stmt {
        Stmt::Assign { target, value }
    }

    pub fn when(condition: Expr, then: Vec<Stmt>) -> Stmt {
        Stmt::If { condition, then }
    }

    fn render(&self, out: &mut String, depth: usize) {
        let indent = "    ".repeat(depth);
        match self {
            Stmt::Comment(text) => {
                let _ = writeln!(out, "{indent}// {text}");
            }
            Stmt::Let { ty, name, value } => {
                let _ = write!(out, "{indent}{} {name} = ", ty.glsl());
                value.render(out);
                out.push_str(";\n");
            }
            Stmt::Assign { target, value } => {
                let _ = write!(out, "{indent}{target} = ");
                value.render(out);
                out.push_str(";\n");
            }
            Stmt::If { condition, then } => {
                let _ = write!(out, "{indent}if (");
                condition.render(out);
                out.push_str(") {\n");
                for stmt in then {
                    stmt.render(out, depth + 1);
                }
                let _ = writeln!(out, "{indent}}}");
            }
            Stmt::Return(value) => match value {
                Some(value) => {
                    let _ = write!(out, "{indent}return ");
                    value.render(out);
                    out.push_str(";\n");
                }
                None => {
                    let _ = writeln!(out, "{indent}return;");
                }
            },
        }
    }

    fn check(&self, scope: &mut Scope<'_>, function: &str) -> Result<(), GenerateError> {
        match self {
            Stmt::Comment(_) => Ok(()),
            Stmt::Let { name, value, .. } => {
                value.check(scope, function)?;
                scope.declare(*name);
                Ok(())
            }
            Stmt::Assign { target, value } => {
                scope.require(target, function)?;
                value.check(scope, function)
            }
            Stmt::If { condition, then } => {
                condition.check(scope, function)?;
                let mark = scope.names.len();
                for stmt in then {
                    stmt.check(scope, function)?;
                }
                scope.names.truncate(mark);
                Ok(())
            }
            Stmt::Return(value) => match value {
                Some(value) => value.check(scope, function),
                None => Ok(()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub ret: Ty,
    pub name: &'static str,
    pub params: Vec<(Ty, &'static str)>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub ty: Ty,
    pub name: &'static str,
    pub value: Expr,
}

/// A complete fragment program: fixed header text, constants, functions.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub header: &'static str,
    /// Names the header declares (inputs, outputs, uniform blocks).
    pub header_globals: &'static [&'static str],
    pub constants: Vec<Constant>,
    pub functions: Vec<Function>,
}

struct Scope<'a> {
    names: Vec<&'a str>,
    functions: Vec<&'a str>,
}

impl<'a> Scope<'a> {
    fn declare(&mut self, name: &'a str) {
        self.names.push(name);
    }

    fn require(&self, name: &str, function: &str) -> Result<(), GenerateError> {
        if self.names.iter().any(|known| *known == name) {
            Ok(())
        } else {
            Err(GenerateError::UndeclaredIdentifier {
                name: name.to_string(),
                function: function.to_string(),
            })
        }
    }
}

impl Module {
    /// Checks that every literal fits a finite 32-bit float and every
    /// identifier and callee is declared before use.
    pub fn validate(&self) -> Result<(), GenerateError> {
        let mut scope = Scope {
            names: self.header_globals.to_vec(),
            functions: Vec::new(),
        };
        for constant in &self.constants {
            constant.value.check(&scope, constant.name)?;
            scope.declare(constant.name);
        }
        for function in &self.functions {
            let mark = scope.names.len();
            for (_, param) in &function.params {
                scope.declare(*param);
            }
            for stmt in &function.body {
                stmt.check(&mut scope, function.name)?;
            }
            scope.names.truncate(mark);
            scope.functions.push(function.name);
        }
        Ok(())
    }

    pub fn to_glsl(&self) -> String {
        let mut out = String::with_capacity(4096);
        out.push_str(self.header);
        out.push('\n');
        for constant in &self.constants {
            let _ = write!(out, "const {} {} = ", constant.ty.glsl(), constant.name);
            constant.value.render(&mut out);
            out.push_str(";\n");
        }
        for function in &self.functions {
            out.push('\n');
            let params = function
                .params
                .iter()
                .map(|(ty, name)| format!("{} {name}", ty.glsl()))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(out, "{} {}({params}) {{", function.ret.glsl(), function.name);
            for stmt in &function.body {
                stmt.render(&mut out, 1);
            }
            out.push_str("}\n");
        }
        out
    }
}
