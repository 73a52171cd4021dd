//! Parser for the textual `.ll`-style IR subset.
//!
//! A logos lexer feeds a hand-written recursive-descent parser. The
//! accepted grammar is the slice of LLVM assembly the pipeline models:
//! scalar globals, function definitions and declarations, the
//! instruction set of [`InstKind`](crate::InstKind), and the four
//! terminators. `source_filename`, `target` lines, metadata and
//! attribute groups are skipped.
//!
//! Instructions receive a [`DebugLoc`] from their source line; values
//! named with plain identifiers are treated as source-level variables
//! (see [`Function::add_value`]).

use logos::Logos;

use crate::error::ParseError;
use crate::func::{BlockId, Function, ValueId, ValueNames};
use crate::inst::{
    BinOp, CastOp, FCmpPred, ICmpPred, Inst, InstKind, Operand, Terminator,
};
use crate::module::{Global, GlobalInit, Module};
use crate::types::IrType;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r";[^\n]*")]
enum Token {
    #[regex(r"%[A-Za-z0-9._$-]+", |lex| lex.slice()[1..].to_string())]
    Local(String),

    #[regex(r"@[A-Za-z0-9._$-]+", |lex| lex.slice()[1..].to_string())]
    GlobalName(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9._]*", |lex| lex.slice().to_string())]
    Word(String),

    #[regex(r"-?[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok(), priority = 4)]
    Float(f64),

    #[regex(r"0x[0-9a-fA-F]+", |lex| u128::from_str_radix(&lex.slice()[2..], 16).ok(), priority = 4)]
    HexInt(u128),

    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i128>().ok())]
    Int(i128),

    #[regex(r#""[^"]*""#, |lex| lex.slice().trim_matches('"').to_string())]
    Str(String),

    #[regex(r"#[0-9]+")]
    AttrRef,

    #[regex(r"![A-Za-z0-9.]+")]
    Meta,

    #[token("!")]
    Bang,

    #[token("=")]
    Equals,
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(":")]
    Colon,
    #[token("...")]
    Ellipsis,
    #[token("*")]
    Star,
}

struct Lexed {
    token: Token,
    line: u32,
}

/// Parses a module from textual IR.
pub fn parse_module(source: &str) -> Result<Module, ParseError> {
    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(source.match_indices('\n').map(|(i, _)| i + 1))
        .collect();
    let line_of = |offset: usize| -> u32 {
        (line_starts.partition_point(|&s| s <= offset)) as u32
    };

    let mut tokens = Vec::new();
    for (result, span) in Token::lexer(source).spanned() {
        let line = line_of(span.start);
        match result {
            Ok(token) => tokens.push(Lexed { token, line }),
            Err(()) => {
                return Err(ParseError::new(
                    line,
                    format!("unexpected character '{}'", &source[span]),
                ))
            }
        }
    }

    Parser { tokens, pos: 0 }.parse_module()
}

struct Parser {
    tokens: Vec<Lexed>,
    pos: usize,
}

impl Parser {
    fn parse_module(mut self) -> Result<Module, ParseError> {
        let mut module = Module::new();
        while self.pos < self.tokens.len() {
            match self.peek() {
                Some(Token::GlobalName(_)) => self.parse_global(&mut module)?,
                Some(Token::Word(w)) => match w.as_str() {
                    "define" => {
                        self.advance();
                        let func = self.parse_function()?;
                        module.add_function(func);
                    }
                    "declare" => {
                        self.advance();
                        let func = self.parse_declaration()?;
                        module.add_function(func);
                    }
                    "source_filename" | "target" => self.skip_toplevel_assignment()?,
                    "attributes" => self.skip_attribute_group()?,
                    other => {
                        let line = self.line();
                        return Err(ParseError::new(
                            line,
                            format!("unexpected token '{other}' at module scope"),
                        ));
                    }
                },
                Some(Token::Meta) => {
                    // Metadata definitions (`!0 = ...`) are skipped
                    // through their right-hand side.
                    self.skip_toplevel_assignment()?;
                }
                _ => {
                    let line = self.line();
                    return Err(ParseError::new(line, "unexpected token at module scope"));
                }
            }
        }
        Ok(module)
    }

    // -----------------------------------------------------------------------
    // Module-level forms
    // -----------------------------------------------------------------------

    fn parse_global(&mut self, module: &mut Module) -> Result<(), ParseError> {
        let name = match self.next_token()? {
            Token::GlobalName(n) => n,
            _ => return Err(self.err_here("expected global name")),
        };
        self.expect(Token::Equals, "'='")?;
        // Skip linkage and addressing words before the type.
        while let Some(Token::Word(w)) = self.peek() {
            match w.as_str() {
                "global" | "constant" | "private" | "internal" | "external" | "dso_local"
                | "unnamed_addr" | "local_unnamed_addr" => {
                    self.advance();
                }
                _ => break,
            }
        }
        let ty = self.parse_type()?;
        let init = match self.next_token()? {
            Token::Int(v) => GlobalInit::Int(v as u128),
            Token::HexInt(v) => GlobalInit::Int(v),
            Token::Float(v) => GlobalInit::Float(v),
            Token::Word(w) if w == "zeroinitializer" => GlobalInit::Zero,
            _ => return Err(self.err_here("expected global initializer")),
        };
        self.skip_align_suffix();
        module.globals.insert(name.clone(), Global { name, ty, init });
        Ok(())
    }

    fn parse_declaration(&mut self) -> Result<Function, ParseError> {
        self.skip_decl_prefixes();
        let ret_ty = self.parse_type()?;
        let name = match self.next_token()? {
            Token::GlobalName(n) => n,
            _ => return Err(self.err_here("expected function name")),
        };
        self.expect(Token::LParen, "'('")?;
        // Declarations list parameter types without names; the pipeline
        // does not need them.
        while !matches!(self.peek(), Some(Token::RParen)) {
            match self.peek() {
                Some(Token::Comma) | Some(Token::Ellipsis) => self.advance(),
                Some(Token::Word(_)) | Some(Token::Local(_)) => self.advance(),
                _ => return Err(self.err_here("malformed declaration parameter list")),
            }
        }
        self.expect(Token::RParen, "')'")?;
        self.skip_function_attrs();
        Ok(Function::new(name, ret_ty))
    }

    fn parse_function(&mut self) -> Result<Function, ParseError> {
        self.skip_decl_prefixes();
        let ret_ty = self.parse_type()?;
        let name = match self.next_token()? {
            Token::GlobalName(n) => n,
            _ => return Err(self.err_here("expected function name")),
        };
        let mut func = Function::new(name, ret_ty);
        let mut names = ValueNames::new();

        self.expect(Token::LParen, "'('")?;
        while !matches!(self.peek(), Some(Token::RParen)) {
            let ty = self.parse_type()?;
            let pname = match self.next_token()? {
                Token::Local(n) => n,
                _ => return Err(self.err_here("expected parameter name")),
            };
            let value = func.add_param(&pname, ty);
            names.insert(pname, value);
            if matches!(self.peek(), Some(Token::Comma)) {
                self.advance();
            }
        }
        self.expect(Token::RParen, "')'")?;
        self.skip_function_attrs();
        self.expect(Token::LBrace, "'{'")?;

        let mut block_names: Vec<(String, BlockId)> = Vec::new();
        let mut current = if self.peek_is_label() {
            let label = self.parse_label_def()?;
            get_block(&mut func, &mut block_names, &label)
        } else {
            let id = func.add_block("entry");
            block_names.push(("entry".to_string(), id));
            id
        };

        loop {
            match self.peek() {
                Some(Token::RBrace) => {
                    self.advance();
                    break;
                }
                None => return Err(self.err_here("unexpected end of input in function body")),
                _ => {}
            }
            if self.peek_is_label() {
                let label = self.parse_label_def()?;
                current = get_block(&mut func, &mut block_names, &label);
                continue;
            }
            self.parse_instruction(&mut func, &mut names, &mut block_names, current)?;
            self.skip_metadata_suffix();
        }

        Ok(func)
    }

    // -----------------------------------------------------------------------
    // Instructions
    // -----------------------------------------------------------------------

    fn parse_instruction(
        &mut self,
        func: &mut Function,
        names: &mut ValueNames,
        blocks: &mut Vec<(String, BlockId)>,
        current: BlockId,
    ) -> Result<(), ParseError> {
        let line = self.line();

        // `%x = <op> ...` or a void instruction.
        let result_name = if let Some(Token::Local(n)) = self.peek() {
            let n = n.clone();
            self.advance();
            self.expect(Token::Equals, "'='")?;
            Some(n)
        } else {
            None
        };

        let opcode = match self.next_token()? {
            Token::Word(w) => w,
            _ => return Err(self.err_at(line, "expected instruction mnemonic")),
        };

        // Terminators close the current block.
        match opcode.as_str() {
            "br" => {
                let term = self.parse_br(func, names, blocks)?;
                func.block_mut(current).terminator = term;
                return Ok(());
            }
            "switch" => {
                let term = self.parse_switch(func, names, blocks)?;
                func.block_mut(current).terminator = term;
                return Ok(());
            }
            "ret" => {
                let ty = self.parse_type()?;
                let value = if ty == IrType::Void {
                    None
                } else {
                    Some(self.parse_operand(func, names, ty)?)
                };
                func.block_mut(current).terminator = Terminator::Ret { value };
                return Ok(());
            }
            "unreachable" => {
                func.block_mut(current).terminator = Terminator::Unreachable;
                return Ok(());
            }
            _ => {}
        }

        let kind = self.parse_value_inst(&opcode, result_name, func, names, blocks)?;
        func.block_mut(current).insts.push(Inst::at(kind, line));
        Ok(())
    }

    fn parse_value_inst(
        &mut self,
        opcode: &str,
        result_name: Option<String>,
        func: &mut Function,
        names: &mut ValueNames,
        blocks: &mut Vec<(String, BlockId)>,
    ) -> Result<InstKind, ParseError> {
        if let Some(op) = binop_from_mnemonic(opcode) {
            let mut nsw = false;
            while let Some(Token::Word(w)) = self.peek() {
                match w.as_str() {
                    "nsw" => {
                        nsw = true;
                        self.advance();
                    }
                    "nuw" | "exact" | "fast" | "nnan" | "ninf" | "nsz" => self.advance(),
                    _ => break,
                }
            }
            let ty = self.parse_type()?;
            let lhs = self.parse_operand(func, names, ty)?;
            self.expect(Token::Comma, "','")?;
            let rhs = self.parse_operand(func, names, ty)?;
            let result = self.define_value(func, names, result_name, ty)?;
            return Ok(InstKind::Binary {
                op,
                nsw,
                result,
                lhs,
                rhs,
            });
        }

        match opcode {
            "icmp" => {
                let pred = self.parse_icmp_pred()?;
                let ty = self.parse_type()?;
                let lhs = self.parse_operand(func, names, ty)?;
                self.expect(Token::Comma, "','")?;
                let rhs = self.parse_operand(func, names, ty)?;
                let result = self.define_value(func, names, result_name, IrType::I1)?;
                Ok(InstKind::ICmp {
                    pred,
                    result,
                    lhs,
                    rhs,
                })
            }
            "fcmp" => {
                let pred = self.parse_fcmp_pred()?;
                let ty = self.parse_type()?;
                let lhs = self.parse_operand(func, names, ty)?;
                self.expect(Token::Comma, "','")?;
                let rhs = self.parse_operand(func, names, ty)?;
                let result = self.define_value(func, names, result_name, IrType::I1)?;
                Ok(InstKind::FCmp {
                    pred,
                    result,
                    lhs,
                    rhs,
                })
            }
            "select" => {
                let cond_ty = self.parse_type()?;
                if cond_ty != IrType::I1 {
                    return Err(self.err_here("select condition must be i1"));
                }
                let cond = self.parse_operand(func, names, cond_ty)?;
                self.expect(Token::Comma, "','")?;
                let then_ty = self.parse_type()?;
                let then_value = self.parse_operand(func, names, then_ty)?;
                self.expect(Token::Comma, "','")?;
                let else_ty = self.parse_type()?;
                let else_value = self.parse_operand(func, names, else_ty)?;
                let result = self.define_value(func, names, result_name, then_ty)?;
                Ok(InstKind::Select {
                    result,
                    cond,
                    then_value,
                    else_value,
                })
            }
            "zext" | "sext" | "trunc" => {
                let op = match opcode {
                    "zext" => CastOp::ZExt,
                    "sext" => CastOp::SExt,
                    _ => CastOp::Trunc,
                };
                let from_ty = self.parse_type()?;
                let value = self.parse_operand(func, names, from_ty)?;
                self.expect_word("to")?;
                let to_ty = self.parse_type()?;
                let result = self.define_value(func, names, result_name, to_ty)?;
                Ok(InstKind::Cast { op, result, value })
            }
            "bitcast" => {
                let from_ty = self.parse_type()?;
                let value = self.parse_operand(func, names, from_ty)?;
                self.expect_word("to")?;
                let to_ty = self.parse_type()?;
                let result = self.define_value(func, names, result_name, to_ty)?;
                Ok(InstKind::PtrCast { result, value })
            }
            "phi" => {
                let ty = self.parse_type()?;
                let mut incoming = Vec::new();
                loop {
                    self.expect(Token::LBracket, "'['")?;
                    let value = self.parse_operand(func, names, ty)?;
                    self.expect(Token::Comma, "','")?;
                    let label = match self.next_token()? {
                        Token::Local(l) => l,
                        _ => return Err(self.err_here("expected predecessor label")),
                    };
                    let pred = get_block(func, blocks, &label);
                    self.expect(Token::RBracket, "']'")?;
                    incoming.push((value, pred));
                    // A comma continues the arm list only when another
                    // `[` follows (a trailing `, !dbg` is metadata).
                    let next_is_arm = matches!(
                        (
                            self.peek(),
                            self.tokens.get(self.pos + 1).map(|l| &l.token)
                        ),
                        (Some(Token::Comma), Some(Token::LBracket))
                    );
                    if next_is_arm {
                        self.advance();
                    } else {
                        break;
                    }
                }
                let result = self.define_value(func, names, result_name, ty)?;
                Ok(InstKind::Phi { result, incoming })
            }
            "call" | "tail" => {
                if opcode == "tail" {
                    self.expect_word("call")?;
                }
                let ret_ty = self.parse_type()?;
                let callee = match self.next_token()? {
                    Token::GlobalName(n) => n,
                    _ => return Err(self.err_here("expected callee name")),
                };
                self.expect(Token::LParen, "'('")?;
                let mut args = Vec::new();
                while !matches!(self.peek(), Some(Token::RParen)) {
                    let ty = self.parse_type()?;
                    let arg = self.parse_operand(func, names, ty)?;
                    args.push(arg);
                    if matches!(self.peek(), Some(Token::Comma)) {
                        self.advance();
                    }
                }
                self.expect(Token::RParen, "')'")?;
                while matches!(self.peek(), Some(Token::AttrRef)) {
                    self.advance();
                }
                let result = match result_name {
                    Some(name) => Some(self.define_value(func, names, Some(name), ret_ty)?),
                    None => None,
                };
                Ok(InstKind::Call {
                    result,
                    callee,
                    args,
                })
            }
            "load" => {
                let ty = self.parse_type()?;
                self.expect(Token::Comma, "','")?;
                self.expect_word("ptr")?;
                let address = self.parse_operand(func, names, IrType::Ptr)?;
                self.skip_align_suffix();
                let result = self.define_value(func, names, result_name, ty)?;
                Ok(InstKind::Load { result, address })
            }
            "store" => {
                let ty = self.parse_type()?;
                let value = self.parse_operand(func, names, ty)?;
                self.expect(Token::Comma, "','")?;
                self.expect_word("ptr")?;
                let address = self.parse_operand(func, names, IrType::Ptr)?;
                self.skip_align_suffix();
                Ok(InstKind::Store { value, address })
            }
            "alloca" => {
                let allocated = self.parse_type()?;
                self.skip_align_suffix();
                let result = self.define_value(func, names, result_name, IrType::Ptr)?;
                Ok(InstKind::Alloca { result, allocated })
            }
            "getelementptr" => {
                if let Some(Token::Word(w)) = self.peek() {
                    if w == "inbounds" {
                        self.advance();
                    }
                }
                let _elem_ty = self.parse_type()?;
                self.expect(Token::Comma, "','")?;
                self.expect_word("ptr")?;
                let base = self.parse_operand(func, names, IrType::Ptr)?;
                let mut indices = Vec::new();
                while matches!(self.peek(), Some(Token::Comma)) {
                    self.advance();
                    let ty = self.parse_type()?;
                    indices.push(self.parse_operand(func, names, ty)?);
                }
                let result = self.define_value(func, names, result_name, IrType::Ptr)?;
                Ok(InstKind::GetElementPtr {
                    result,
                    base,
                    indices,
                })
            }
            other => Err(self.err_here(&format!("unsupported instruction '{other}'"))),
        }
    }

    fn parse_br(
        &mut self,
        func: &mut Function,
        names: &mut ValueNames,
        blocks: &mut Vec<(String, BlockId)>,
    ) -> Result<Terminator, ParseError> {
        match self.peek() {
            Some(Token::Word(w)) if w == "label" => {
                self.advance();
                let target = self.parse_label_ref(func, blocks)?;
                Ok(Terminator::Br { target })
            }
            _ => {
                let ty = self.parse_type()?;
                if ty != IrType::I1 {
                    return Err(self.err_here("conditional branch requires an i1 condition"));
                }
                let cond = self.parse_operand(func, names, ty)?;
                self.expect(Token::Comma, "','")?;
                self.expect_word("label")?;
                let then_target = self.parse_label_ref(func, blocks)?;
                self.expect(Token::Comma, "','")?;
                self.expect_word("label")?;
                let else_target = self.parse_label_ref(func, blocks)?;
                Ok(Terminator::CondBr {
                    cond,
                    then_target,
                    else_target,
                })
            }
        }
    }

    fn parse_switch(
        &mut self,
        func: &mut Function,
        names: &mut ValueNames,
        blocks: &mut Vec<(String, BlockId)>,
    ) -> Result<Terminator, ParseError> {
        let ty = self.parse_type()?;
        let bits = ty
            .int_bits()
            .ok_or_else(|| self.err_here("switch requires an integer operand"))?;
        let value = self.parse_operand(func, names, ty)?;
        self.expect(Token::Comma, "','")?;
        self.expect_word("label")?;
        let default = self.parse_label_ref(func, blocks)?;
        self.expect(Token::LBracket, "'['")?;
        let mut cases = Vec::new();
        while !matches!(self.peek(), Some(Token::RBracket)) {
            let case_ty = self.parse_type()?;
            if case_ty != ty {
                return Err(self.err_here("switch case type must match the switched value"));
            }
            let case_value = match self.next_token()? {
                Token::Int(v) => crate::mask_to(v as u128, bits),
                Token::HexInt(v) => crate::mask_to(v, bits),
                _ => return Err(self.err_here("expected case constant")),
            };
            self.expect(Token::Comma, "','")?;
            self.expect_word("label")?;
            let target = self.parse_label_ref(func, blocks)?;
            cases.push((case_value, target));
        }
        self.expect(Token::RBracket, "']'")?;
        Ok(Terminator::Switch {
            value,
            bits,
            default,
            cases,
        })
    }

    // -----------------------------------------------------------------------
    // Leaf parsers
    // -----------------------------------------------------------------------

    fn parse_type(&mut self) -> Result<IrType, ParseError> {
        match self.next_token()? {
            Token::Word(w) => type_from_word(&w)
                .ok_or_else(|| self.err_here(&format!("unknown type '{w}'"))),
            _ => Err(self.err_here("expected a type")),
        }
    }

    fn parse_operand(
        &mut self,
        func: &mut Function,
        names: &mut ValueNames,
        ty: IrType,
    ) -> Result<Operand, ParseError> {
        match self.next_token()? {
            Token::Local(name) => {
                let value = value_for(func, names, &name, ty);
                Ok(Operand::Value(value))
            }
            Token::Int(v) => match ty {
                IrType::Int { bits } => Ok(Operand::ConstInt {
                    bits,
                    value: crate::mask_to(v as u128, bits),
                }),
                IrType::Float32 => Ok(Operand::ConstFloat {
                    double: false,
                    bits: (v as f32).to_bits() as u64,
                }),
                IrType::Float64 => Ok(Operand::ConstFloat {
                    double: true,
                    bits: (v as f64).to_bits(),
                }),
                _ => Err(self.err_here("integer constant in non-numeric position")),
            },
            Token::HexInt(v) => match ty {
                IrType::Int { bits } => Ok(Operand::ConstInt {
                    bits,
                    value: crate::mask_to(v, bits),
                }),
                // LLVM spells float constants as hex bit patterns.
                IrType::Float64 => Ok(Operand::ConstFloat {
                    double: true,
                    bits: v as u64,
                }),
                IrType::Float32 => Ok(Operand::ConstFloat {
                    double: false,
                    bits: v as u64,
                }),
                _ => Err(self.err_here("hex constant in non-numeric position")),
            },
            Token::Float(v) => match ty {
                IrType::Float32 => Ok(Operand::ConstFloat {
                    double: false,
                    bits: (v as f32).to_bits() as u64,
                }),
                IrType::Float64 => Ok(Operand::ConstFloat {
                    double: true,
                    bits: v.to_bits(),
                }),
                _ => Err(self.err_here("float constant in non-float position")),
            },
            Token::Word(w) => match w.as_str() {
                "true" => Ok(Operand::ConstInt { bits: 1, value: 1 }),
                "false" => Ok(Operand::ConstInt { bits: 1, value: 0 }),
                "null" => Ok(Operand::NullPtr),
                "undef" | "poison" => Ok(Operand::Undef(ty)),
                other => Err(self.err_here(&format!("unexpected operand '{other}'"))),
            },
            Token::GlobalName(name) => Ok(Operand::Global(name)),
            _ => Err(self.err_here("expected an operand")),
        }
    }

    fn parse_icmp_pred(&mut self) -> Result<ICmpPred, ParseError> {
        let word = self.next_word()?;
        let pred = match word.as_str() {
            "eq" => ICmpPred::Eq,
            "ne" => ICmpPred::Ne,
            "ugt" => ICmpPred::Ugt,
            "uge" => ICmpPred::Uge,
            "ult" => ICmpPred::Ult,
            "ule" => ICmpPred::Ule,
            "sgt" => ICmpPred::Sgt,
            "sge" => ICmpPred::Sge,
            "slt" => ICmpPred::Slt,
            "sle" => ICmpPred::Sle,
            other => return Err(self.err_here(&format!("unknown icmp predicate '{other}'"))),
        };
        Ok(pred)
    }

    fn parse_fcmp_pred(&mut self) -> Result<FCmpPred, ParseError> {
        let word = self.next_word()?;
        let pred = match word.as_str() {
            "false" => FCmpPred::False,
            "oeq" => FCmpPred::Oeq,
            "ogt" => FCmpPred::Ogt,
            "oge" => FCmpPred::Oge,
            "olt" => FCmpPred::Olt,
            "ole" => FCmpPred::Ole,
            "one" => FCmpPred::One,
            "ord" => FCmpPred::Ord,
            "ueq" => FCmpPred::Ueq,
            "ugt" => FCmpPred::Ugt,
            "uge" => FCmpPred::Uge,
            "ult" => FCmpPred::Ult,
            "ule" => FCmpPred::Ule,
            "une" => FCmpPred::Une,
            "uno" => FCmpPred::Uno,
            "true" => FCmpPred::True,
            other => return Err(self.err_here(&format!("unknown fcmp predicate '{other}'"))),
        };
        Ok(pred)
    }

    fn parse_label_def(&mut self) -> Result<String, ParseError> {
        let label = match self.next_token()? {
            Token::Word(w) => w,
            Token::Int(v) => v.to_string(),
            _ => return Err(self.err_here("expected block label")),
        };
        self.expect(Token::Colon, "':'")?;
        Ok(label)
    }

    fn parse_label_ref(
        &mut self,
        func: &mut Function,
        blocks: &mut Vec<(String, BlockId)>,
    ) -> Result<BlockId, ParseError> {
        match self.next_token()? {
            Token::Local(l) => Ok(get_block(func, blocks, &l)),
            _ => Err(self.err_here("expected label reference")),
        }
    }

    fn define_value(
        &mut self,
        func: &mut Function,
        names: &mut ValueNames,
        result_name: Option<String>,
        ty: IrType,
    ) -> Result<ValueId, ParseError> {
        let name = result_name.ok_or_else(|| self.err_here("instruction requires a result"))?;
        let value = value_for(func, names, &name, ty);
        // The definition's type annotation is authoritative over any
        // forward-reference guess.
        func.values[value.0 as usize].ty = ty;
        Ok(value)
    }

    // -----------------------------------------------------------------------
    // Token-stream plumbing
    // -----------------------------------------------------------------------

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|l| &l.token)
    }

    fn peek_is_label(&self) -> bool {
        matches!(
            (self.peek(), self.tokens.get(self.pos + 1).map(|l| &l.token)),
            (Some(Token::Word(_)), Some(Token::Colon)) | (Some(Token::Int(_)), Some(Token::Colon))
        )
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn line(&self) -> u32 {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|l| l.line)
            .unwrap_or(1)
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        let token = self
            .tokens
            .get(self.pos)
            .map(|l| l.token.clone())
            .ok_or_else(|| ParseError::new(self.line(), "unexpected end of input"))?;
        self.pos += 1;
        Ok(token)
    }

    fn next_word(&mut self) -> Result<String, ParseError> {
        match self.next_token()? {
            Token::Word(w) => Ok(w),
            _ => Err(self.err_here("expected identifier")),
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ParseError> {
        let token = self.next_token()?;
        if token == expected {
            Ok(())
        } else {
            Err(self.err_here(&format!("expected {what}, found {token:?}")))
        }
    }

    fn expect_word(&mut self, word: &str) -> Result<(), ParseError> {
        match self.next_token()? {
            Token::Word(w) if w == word => Ok(()),
            other => Err(self.err_here(&format!("expected '{word}', found {other:?}"))),
        }
    }

    fn skip_align_suffix(&mut self) {
        if let (Some(Token::Comma), Some(Token::Word(w))) = (
            self.peek(),
            self.tokens.get(self.pos + 1).map(|l| &l.token),
        ) {
            if w == "align" {
                self.pos += 3;
            }
        }
    }

    /// Skips linkage, visibility, and return-attribute words that may
    /// precede the return type of a `define`/`declare`.
    fn skip_decl_prefixes(&mut self) {
        while let Some(Token::Word(w)) = self.peek() {
            match w.as_str() {
                "dso_local" | "internal" | "private" | "external" | "weak" | "hidden"
                | "noundef" | "zeroext" | "signext" => self.advance(),
                _ => break,
            }
        }
    }

    fn skip_function_attrs(&mut self) {
        while let Some(token) = self.peek() {
            match token {
                Token::AttrRef => self.advance(),
                Token::Word(w)
                    if matches!(
                        w.as_str(),
                        "nounwind" | "noinline" | "optnone" | "uwtable" | "dso_local"
                    ) =>
                {
                    self.advance()
                }
                _ => break,
            }
        }
    }

    fn skip_toplevel_assignment(&mut self) -> Result<(), ParseError> {
        // `source_filename = "..."`, `target triple = "..."`, `!0 = ...`:
        // consume through the right-hand side after '='.
        while !matches!(self.peek(), Some(Token::Equals)) {
            if self.peek().is_none() {
                return Err(self.err_here("unexpected end of input"));
            }
            self.advance();
        }
        self.advance(); // '='
        while matches!(self.peek(), Some(Token::Word(_)) | Some(Token::Bang)) {
            self.advance();
        }
        if matches!(self.peek(), Some(Token::LBrace)) {
            while !matches!(self.peek(), Some(Token::RBrace)) {
                if self.peek().is_none() {
                    return Err(self.err_here("unterminated metadata node"));
                }
                self.advance();
            }
            self.advance();
        } else {
            self.next_token()?;
        }
        Ok(())
    }

    /// Skips a trailing `, !dbg !7`-style metadata suffix.
    fn skip_metadata_suffix(&mut self) {
        while let (Some(Token::Comma), Some(Token::Meta)) = (
            self.peek(),
            self.tokens.get(self.pos + 1).map(|l| &l.token),
        ) {
            self.advance();
            while matches!(self.peek(), Some(Token::Meta)) {
                self.advance();
            }
        }
    }

    fn skip_attribute_group(&mut self) -> Result<(), ParseError> {
        // `attributes #0 = { ... }`
        while !matches!(self.peek(), Some(Token::LBrace)) {
            if self.peek().is_none() {
                return Err(self.err_here("unexpected end of input"));
            }
            self.advance();
        }
        while !matches!(self.peek(), Some(Token::RBrace)) {
            if self.peek().is_none() {
                return Err(self.err_here("unterminated attribute group"));
            }
            self.advance();
        }
        self.advance();
        Ok(())
    }

    fn err_here(&self, message: &str) -> ParseError {
        ParseError::new(self.line(), message)
    }

    fn err_at(&self, line: u32, message: &str) -> ParseError {
        ParseError::new(line, message)
    }
}

fn type_from_word(word: &str) -> Option<IrType> {
    match word {
        "float" => Some(IrType::Float32),
        "double" => Some(IrType::Float64),
        "ptr" => Some(IrType::Ptr),
        "void" => Some(IrType::Void),
        _ => {
            let bits: u32 = word.strip_prefix('i')?.parse().ok()?;
            (bits >= 1 && bits <= 128).then_some(IrType::Int { bits })
        }
    }
}

fn binop_from_mnemonic(word: &str) -> Option<BinOp> {
    Some(match word {
        "add" => BinOp::Add,
        "sub" => BinOp::Sub,
        "mul" => BinOp::Mul,
        "sdiv" => BinOp::SDiv,
        "udiv" => BinOp::UDiv,
        "srem" => BinOp::SRem,
        "urem" => BinOp::URem,
        "shl" => BinOp::Shl,
        "lshr" => BinOp::LShr,
        "ashr" => BinOp::AShr,
        "and" => BinOp::And,
        "or" => BinOp::Or,
        "xor" => BinOp::Xor,
        "fadd" => BinOp::FAdd,
        "fsub" => BinOp::FSub,
        "fmul" => BinOp::FMul,
        "fdiv" => BinOp::FDiv,
        _ => return None,
    })
}

fn value_for(func: &mut Function, names: &mut ValueNames, name: &str, ty: IrType) -> ValueId {
    if let Some(id) = names.get(name) {
        return *id;
    }
    let id = func.add_value(name, ty);
    names.insert(name.to_string(), id);
    id
}

fn get_block(func: &mut Function, blocks: &mut Vec<(String, BlockId)>, label: &str) -> BlockId {
    if let Some((_, id)) = blocks.iter().find(|(l, _)| l == label) {
        return *id;
    }
    let id = func.add_block(label);
    blocks.push((label.to_string(), id));
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_branching_function() {
        let src = r#"
define i32 @main() {
entry:
  %a = call i32 @__VERIFIER_nondet_int()
  %cond = icmp eq i32 %a, 0
  br i1 %cond, label %then, label %else

then:
  br label %exit

else:
  br label %exit

exit:
  %r = phi i32 [ 1, %then ], [ 2, %else ]
  ret i32 %r
}

declare i32 @__VERIFIER_nondet_int()
"#;
        let module = parse_module(src).unwrap();
        let main = module.function("main").unwrap();
        assert_eq!(main.blocks.len(), 4);
        assert_eq!(main.block(main.entry()).label, "entry");
        assert!(module.function("__VERIFIER_nondet_int").unwrap().is_declaration());

        let exit = main.block_by_label("exit").unwrap();
        let phi = &main.block(exit).insts[0];
        match &phi.kind {
            InstKind::Phi { incoming, .. } => assert_eq!(incoming.len(), 2),
            other => panic!("expected phi, got {other:?}"),
        }
    }

    #[test]
    fn parses_globals_and_memory_ops() {
        let src = r#"
@b = global i32 1
@c = global i32 2

define i32 @main() {
entry:
  %p = alloca i32
  store i32 7, ptr %p
  %v = load i32, ptr %p
  %q = load i32, ptr @b
  ret i32 %v
}
"#;
        let module = parse_module(src).unwrap();
        assert_eq!(module.globals.len(), 2);
        assert_eq!(
            module.globals.get("b").unwrap().init,
            GlobalInit::Int(1)
        );
        let main = module.function("main").unwrap();
        assert_eq!(main.block(main.entry()).insts.len(), 4);
    }

    #[test]
    fn parses_switch_terminators() {
        let src = r#"
define void @main(i32 %x) {
entry:
  switch i32 %x, label %default [ i32 1, label %one i32 2, label %two ]
one:
  ret void
two:
  ret void
default:
  ret void
}
"#;
        let module = parse_module(src).unwrap();
        let main = module.function("main").unwrap();
        match &main.block(main.entry()).terminator {
            Terminator::Switch { cases, bits, .. } => {
                assert_eq!(*bits, 32);
                assert_eq!(cases.len(), 2);
                assert_eq!(cases[0].0, 1);
            }
            other => panic!("expected switch, got {other:?}"),
        }
    }

    #[test]
    fn instructions_carry_source_lines() {
        let src = "define void @main() {\nentry:\n  %x = add i32 1, 2\n  ret void\n}\n";
        let module = parse_module(src).unwrap();
        let main = module.function("main").unwrap();
        let inst = &main.block(main.entry()).insts[0];
        assert_eq!(inst.loc.map(|l| l.line), Some(3));
    }

    #[test]
    fn negative_constants_are_masked_to_width() {
        let src = "define void @main() {\nentry:\n  %x = add i8 -1, 0\n  ret void\n}\n";
        let module = parse_module(src).unwrap();
        let main = module.function("main").unwrap();
        match &main.block(main.entry()).insts[0].kind {
            InstKind::Binary { lhs, .. } => {
                assert_eq!(lhs, &Operand::ConstInt { bits: 8, value: 0xFF });
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_instruction_reports_line() {
        let src = "define void @main() {\nentry:\n  %x = frobnicate i32 1\n  ret void\n}\n";
        let err = parse_module(src).unwrap_err();
        assert!(err.to_string().contains("frobnicate"));
        assert_eq!(err.line, 3);
    }

    #[test]
    fn float_and_fcmp_parse() {
        let src = r#"
define i1 @main(double %x) {
entry:
  %y = fadd double %x, 1.5
  %c = fcmp oge double %y, 0.0
  ret i1 %c
}
"#;
        let module = parse_module(src).unwrap();
        let main = module.function("main").unwrap();
        match &main.block(main.entry()).insts[1].kind {
            InstKind::FCmp { pred, .. } => assert_eq!(*pred, FCmpPred::Oge),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn module_prints_and_reparses() {
        let src = r#"
@g = global i32 5

define i32 @main() {
entry:
  %a = call i32 @__VERIFIER_nondet_int()
  %b = add nsw i32 %a, 1
  %c = icmp slt i32 %b, 10
  br i1 %c, label %small, label %big
small:
  ret i32 0
big:
  ret i32 %b
}

declare i32 @__VERIFIER_nondet_int()
"#;
        let module = parse_module(src).unwrap();
        let printed = module.to_string();
        let reparsed = parse_module(&printed).unwrap();
        assert_eq!(reparsed.to_string(), printed);
    }
}
