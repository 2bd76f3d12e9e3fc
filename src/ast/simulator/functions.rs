//! Function, class and call helpers
//!
//! `MAKE_FUNCTION` recursively decompiles the nested code object and leaves a
//! pending definition on the stack; the store that follows names it. A call
//! whose single argument is a pending definition is a decorator application.
//! Class bodies arrive as a function passed to `__build_class__`.

use super::Frame;
use crate::ast::control_flow::ComprehensionRecognizer;
use crate::ast::nodes::{Arguments, ClassDef, Expr, FunctionDef, Keyword, Stmt};
use crate::bytecode::{Constant, Instruction, OperationKind};
use crate::decompiler::Decompiler;
use crate::error::{Error, Result};

const MAKE_FUNCTION_DEFAULTS: u32 = 0x01;
const MAKE_FUNCTION_KW_DEFAULTS: u32 = 0x02;
const MAKE_FUNCTION_ANNOTATIONS: u32 = 0x04;
const MAKE_FUNCTION_CLOSURE: u32 = 0x08;

/// Names the compiler binds in every class body
const CLASS_SCAFFOLDING: &[&str] = &["__module__", "__qualname__", "__classcell__"];

/// Trait providing function and call helper methods
pub trait FunctionHelpers {
    fn simulate_make_function(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    fn simulate_call_function(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    fn simulate_call_function_kw(
        &self,
        frame: &mut Frame<'_>,
        instruction: &Instruction,
    ) -> Result<()>;

    fn simulate_call_method(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    fn simulate_return(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    fn simulate_yield(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;

    fn simulate_raise(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()>;
}

impl FunctionHelpers for Decompiler {
    fn simulate_make_function(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let flags = instruction.count()?;
        let qualname = frame.pop(instruction)?;
        let code = match frame.pop(instruction)? {
            Expr::Constant(Constant::Code(code)) => code,
            other => {
                return Err(Error::pattern(
                    instruction.position,
                    format!("MAKE_FUNCTION expects a code object, found {:?}", other),
                ))
            }
        };
        log::debug!(
            "Building function {} ({})",
            code.name,
            qualname.as_str_constant().unwrap_or("?")
        );

        if flags & MAKE_FUNCTION_CLOSURE != 0 {
            frame.pop(instruction)?;
        }
        let annotations = if flags & MAKE_FUNCTION_ANNOTATIONS != 0 {
            keywords_from_map(frame.pop(instruction)?, instruction)?
        } else {
            Vec::new()
        };
        let kw_defaults = if flags & MAKE_FUNCTION_KW_DEFAULTS != 0 {
            keywords_from_map(frame.pop(instruction)?, instruction)?
        } else {
            Vec::new()
        };
        let defaults = if flags & MAKE_FUNCTION_DEFAULTS != 0 {
            match frame.pop(instruction)? {
                Expr::Tuple(items) => items,
                Expr::Constant(Constant::Tuple(items)) => {
                    items.into_iter().map(Expr::Constant).collect()
                }
                other => {
                    return Err(Error::pattern(
                        instruction.position,
                        format!("function defaults must be a tuple, found {:?}", other),
                    ))
                }
            }
        } else {
            Vec::new()
        };

        let args = Arguments {
            args: code.arg_names.clone(),
            vararg: code.vararg.clone(),
            kwonlyargs: code.kwonly_arg_names.clone(),
            kwarg: code.kwarg.clone(),
            defaults,
            kw_defaults,
            annotations,
        };

        if code.is_lambda() {
            let body = match self.reconstruct(&code, false)?.as_slice() {
                [Stmt::Return(Some(body))] => body.clone(),
                _ => {
                    return Err(Error::pattern(
                        instruction.position,
                        "lambda body is not a single returned expression",
                    ))
                }
            };
            frame.push(Expr::Lambda {
                args,
                body: Box::new(body),
            });
            return Ok(());
        }

        let body = if self.options().decompile_nested || code.is_comprehension() {
            self.decompile_code(&code)?
        } else {
            vec![Stmt::Pass]
        };
        frame.push(Expr::Function(Box::new(FunctionDef {
            name: code.name.clone(),
            args,
            body,
            decorators: Vec::new(),
        })));
        Ok(())
    }

    fn simulate_call_function(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let mut args = frame.pop_n(instruction.count()? as usize, instruction)?;
        let func = frame.pop(instruction)?;

        if func == Expr::BuildClass {
            let class = build_class(args, Vec::new(), instruction)?;
            frame.push(Expr::Class(Box::new(class)));
            return Ok(());
        }

        if args.len() == 1 && matches!(args[0], Expr::Function(_) | Expr::Class(_)) {
            let decorated = match args.pop() {
                Some(Expr::Function(mut function)) => {
                    function.decorators.insert(0, func);
                    Expr::Function(function)
                }
                Some(Expr::Class(mut class)) => {
                    class.decorators.insert(0, func);
                    Expr::Class(class)
                }
                _ => return Err(Error::internal("decorated definition vanished")),
            };
            frame.push(decorated);
            return Ok(());
        }

        frame.push(Expr::call(func, args));
        Ok(())
    }

    fn simulate_call_function_kw(
        &self,
        frame: &mut Frame<'_>,
        instruction: &Instruction,
    ) -> Result<()> {
        let names = match frame.pop(instruction)? {
            Expr::Constant(Constant::Tuple(names)) => names
                .into_iter()
                .map(|name| match name {
                    Constant::Str(name) => Ok(name),
                    other => Err(Error::pattern(
                        instruction.position,
                        format!("keyword name must be a string, found {}", other),
                    )),
                })
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(Error::pattern(
                    instruction.position,
                    format!("CALL_FUNCTION_KW expects a name tuple, found {:?}", other),
                ))
            }
        };
        let count = instruction.count()? as usize;
        if names.len() > count {
            return Err(Error::pattern(
                instruction.position,
                format!("{} keyword names for {} arguments", names.len(), count),
            ));
        }
        let mut args = frame.pop_n(count, instruction)?;
        let keyword_values = args.split_off(count - names.len());
        let keywords = names
            .into_iter()
            .zip(keyword_values)
            .map(|(arg, value)| Keyword { arg, value })
            .collect();
        let func = frame.pop(instruction)?;

        if func == Expr::BuildClass {
            let class = build_class(args, keywords, instruction)?;
            frame.push(Expr::Class(Box::new(class)));
        } else {
            frame.push(Expr::Call {
                func: Box::new(func),
                args,
                keywords,
            });
        }
        Ok(())
    }

    fn simulate_call_method(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let args = frame.pop_n(instruction.count()? as usize, instruction)?;
        let method = frame.pop(instruction)?;
        frame.push(Expr::call(method, args));
        Ok(())
    }

    fn simulate_return(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let value = frame.pop(instruction)?;
        frame.emit(Stmt::Return(Some(value)));
        Ok(())
    }

    fn simulate_yield(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        if frame.ctx.clause.is_some()
            && frame.stream.peek_kind() == Some(OperationKind::PopTop)
        {
            return self.record_generator_element(frame, instruction);
        }
        let value = frame.pop(instruction)?;
        let value = (!value.is_none_constant()).then(|| Box::new(value));
        frame.push(Expr::Yield(value));
        Ok(())
    }

    fn simulate_raise(&self, frame: &mut Frame<'_>, instruction: &Instruction) -> Result<()> {
        let (exc, cause) = match instruction.count()? {
            0 => (None, None),
            1 => (Some(frame.pop(instruction)?), None),
            2 => {
                let cause = frame.pop(instruction)?;
                (Some(frame.pop(instruction)?), Some(cause))
            }
            other => {
                return Err(Error::pattern(
                    instruction.position,
                    format!("RAISE_VARARGS with {} operands", other),
                ))
            }
        };
        frame.emit(Stmt::Raise { exc, cause });
        Ok(())
    }
}

/// `__build_class__(body, name, *bases, **keywords)`
fn build_class(args: Vec<Expr>, keywords: Vec<Keyword>, instruction: &Instruction) -> Result<ClassDef> {
    let mut args = args.into_iter();
    let body = match args.next() {
        Some(Expr::Function(function)) => function.body,
        _ => {
            return Err(Error::pattern(
                instruction.position,
                "class builder called without a body function",
            ))
        }
    };
    let name = match args.next() {
        Some(Expr::Constant(Constant::Str(name))) => name,
        _ => {
            return Err(Error::pattern(
                instruction.position,
                "class builder called without a class name",
            ))
        }
    };
    Ok(ClassDef {
        name,
        bases: args.collect(),
        keywords,
        body: strip_class_scaffolding(body),
        decorators: Vec::new(),
    })
}

/// Drop the `__module__`/`__qualname__` bindings and the `__class__` cell
/// return the compiler adds to every class body
fn strip_class_scaffolding(body: Vec<Stmt>) -> Vec<Stmt> {
    let mut body: Vec<Stmt> = body
        .into_iter()
        .filter(|stmt| match stmt {
            Stmt::Assign { targets, .. } => !targets.iter().all(|target| {
                matches!(target, Expr::Name(name) if CLASS_SCAFFOLDING.contains(&name.as_str()))
            }),
            _ => true,
        })
        .collect();
    if matches!(body.last(), Some(Stmt::Return(Some(Expr::Name(name)))) if name == "__class__") {
        body.pop();
    }
    if body.is_empty() {
        body.push(Stmt::Pass);
    }
    body
}

/// Annotation and keyword-default maps are keyed by parameter name
fn keywords_from_map(map: Expr, instruction: &Instruction) -> Result<Vec<Keyword>> {
    let pairs = match map {
        Expr::Dict(pairs) => pairs,
        other => {
            return Err(Error::pattern(
                instruction.position,
                format!("expected a parameter map, found {:?}", other),
            ))
        }
    };
    pairs
        .into_iter()
        .map(|(key, value)| match key.as_str_constant() {
            Some(arg) => Ok(Keyword {
                arg: arg.to_string(),
                value,
            }),
            None => Err(Error::pattern(
                instruction.position,
                "parameter map keys must be names",
            )),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_scaffolding_is_removed() {
        let body = vec![
            Stmt::assign(Expr::name("__module__"), Expr::name("__name__")),
            Stmt::assign(Expr::name("__qualname__"), Expr::constant("A")),
            Stmt::assign(Expr::name("x"), Expr::constant(1)),
            Stmt::Return(Some(Expr::name("__class__"))),
        ];
        assert_eq!(
            strip_class_scaffolding(body),
            vec![Stmt::assign(Expr::name("x"), Expr::constant(1))]
        );
    }

    #[test]
    fn empty_class_body_becomes_pass() {
        let body = vec![Stmt::assign(Expr::name("__module__"), Expr::name("__name__"))];
        assert_eq!(strip_class_scaffolding(body), vec![Stmt::Pass]);
    }
}
