//! Property tests for the simplifying builder.
//!
//! Checks the folder against independently computed two's-complement
//! semantics and verifies the structural invariants that the rest of the
//! pipeline relies on (interning identity, And/Or normal form, evaluator
//! agreement).

use proptest::prelude::*;

use warden_core::{eval, Context, ExprKind, LiteralValue, Valuation};

fn lit32(ctx: &mut Context, v: u32) -> warden_core::ExprId {
    ctx.bv_lit(v as u128, 32)
}

proptest! {
    #[test]
    fn add_matches_wrapping_semantics(a: u32, b: u32) {
        let mut ctx = Context::new();
        let (x, y) = (lit32(&mut ctx, a), lit32(&mut ctx, b));
        let sum = ctx.add(x, y);
        let lit = ctx.literal(sum).and_then(LiteralValue::as_bv).unwrap();
        prop_assert_eq!(lit, (32, a.wrapping_add(b) as u128));
    }

    #[test]
    fn sub_and_mul_match_wrapping_semantics(a: u32, b: u32) {
        let mut ctx = Context::new();
        let (x, y) = (lit32(&mut ctx, a), lit32(&mut ctx, b));
        let diff = ctx.sub(x, y);
        let prod = ctx.mul(x, y);
        prop_assert_eq!(
            ctx.literal(diff).and_then(LiteralValue::as_bv).unwrap(),
            (32, a.wrapping_sub(b) as u128)
        );
        prop_assert_eq!(
            ctx.literal(prod).and_then(LiteralValue::as_bv).unwrap(),
            (32, a.wrapping_mul(b) as u128)
        );
    }

    #[test]
    fn signed_division_matches_i32_semantics(a: i32, b in prop::num::i32::ANY.prop_filter("nonzero", |v| *v != 0)) {
        let mut ctx = Context::new();
        let x = lit32(&mut ctx, a as u32);
        let y = lit32(&mut ctx, b as u32);
        let q = ctx.sdiv(x, y);
        let r = ctx.srem(x, y);
        prop_assert_eq!(
            ctx.literal(q).and_then(LiteralValue::as_bv).unwrap(),
            (32, a.wrapping_div(b) as u32 as u128)
        );
        prop_assert_eq!(
            ctx.literal(r).and_then(LiteralValue::as_bv).unwrap(),
            (32, a.wrapping_rem(b) as u32 as u128)
        );
    }

    #[test]
    fn signed_comparison_matches_i32_order(a: i32, b: i32) {
        let mut ctx = Context::new();
        let x = lit32(&mut ctx, a as u32);
        let y = lit32(&mut ctx, b as u32);
        let lt = ctx.slt(x, y);
        prop_assert_eq!(
            ctx.literal(lt).and_then(LiteralValue::as_bool),
            Some(a < b)
        );
        let ge = ctx.ugt_eq(x, y);
        prop_assert_eq!(
            ctx.literal(ge).and_then(LiteralValue::as_bool),
            Some((a as u32) >= (b as u32))
        );
    }

    #[test]
    fn sext_then_extract_roundtrips(a: i8) {
        let mut ctx = Context::new();
        let small = ctx.bv_lit(a as u8 as u128, 8);
        let wide = ctx.sext(small, 32);
        let back = ctx.extract(wide, 0, 8);
        prop_assert_eq!(back, small);
        // The widened literal keeps the signed value.
        prop_assert_eq!(
            ctx.literal(wide).and_then(|l| l.as_signed()),
            Some(a as i128)
        );
    }

    #[test]
    fn and_or_normal_form_holds(bits in prop::collection::vec(prop::bool::ANY, 0..6)) {
        let mut ctx = Context::new();
        // Mix variables and literal operands, then check the normal form.
        let mut ops = Vec::new();
        for (i, b) in bits.iter().enumerate() {
            if *b {
                ops.push(ctx.bool_lit(i % 3 == 0));
            } else {
                let ty = warden_core::TypeId::BOOL;
                let v = ctx.declare_variable(&format!("v{i}"), ty).unwrap();
                ops.push(ctx.var_ref(v));
            }
        }
        let conj = ctx.and_many(&ops);
        let disj = ctx.or_many(&ops);
        for e in [conj, disj] {
            let node = ctx.expr(e);
            if matches!(node.kind, ExprKind::And | ExprKind::Or) {
                for &op in node.operands.iter() {
                    let child = ctx.expr(op);
                    prop_assert!(child.kind != node.kind, "nested variadic operand");
                    prop_assert!(
                        child.kind.literal().is_none(),
                        "boolean literal left in operand list"
                    );
                }
            }
        }
    }

    #[test]
    fn evaluator_agrees_with_folder_on_shifts(a: u16, s in 0u16..20) {
        let mut ctx = Context::new();
        let ty = ctx.bv_type(16);
        let x = ctx.declare_variable("x", ty).unwrap();
        let n = ctx.declare_variable("n", ty).unwrap();
        let xr = ctx.var_ref(x);
        let nr = ctx.var_ref(n);
        let symbolic = [ctx.shl(xr, nr), ctx.lshr(xr, nr), ctx.ashr(xr, nr)];

        let mut val = Valuation::new();
        val.bind(x, LiteralValue::bv(16, a as u128));
        val.bind(n, LiteralValue::bv(16, s as u128));

        let xl = ctx.bv_lit(a as u128, 16);
        let nl = ctx.bv_lit(s as u128, 16);
        let folded = [ctx.shl(xl, nl), ctx.lshr(xl, nl), ctx.ashr(xl, nl)];

        for (sym, fol) in symbolic.iter().zip(folded.iter()) {
            let evaluated = eval::evaluate(&ctx, *sym, &val);
            prop_assert_eq!(evaluated.as_ref(), ctx.literal(*fol));
        }
    }

    #[test]
    fn interning_is_structural(a: u32, b: u32) {
        let mut ctx = Context::new();
        let ty = ctx.bv_type(32);
        let x = ctx.declare_variable("x", ty).unwrap();
        let xr = ctx.var_ref(x);
        let la = ctx.bv_lit(a as u128, 32);
        let e1 = ctx.add(xr, la);
        let la2 = ctx.bv_lit(a as u128, 32);
        let e2 = ctx.add(xr, la2);
        prop_assert_eq!(e1, e2);
        if a != b {
            let lb = ctx.bv_lit(b as u128, 32);
            let e3 = ctx.add(xr, lb);
            prop_assert_ne!(e1, e3);
        }
    }
}
