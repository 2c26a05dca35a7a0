//! State-vector compilation: a parse tree → a contiguous byte buffer, typed
//! element handles, named regions, and an optional shared lock.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{Diagnostic, SvCompileError};
use crate::primitive::PrimitiveType;
use crate::runtime::element::{Element, ElementAccess};
use crate::runtime::lock::{Lock, MutexLock};
use crate::runtime::region::Region;
use crate::runtime::state_vector::StateVector;
use crate::sv::parse::SvParse;

fn make_element(ty: PrimitiveType, name: &str, offset: usize, buffer: Rc<RefCell<Vec<u8>>>, lock: Option<Rc<dyn Lock>>) -> Rc<dyn ElementAccess> {
    macro_rules! mk {
        ($t:ty) => {
            Rc::new(Element::<$t>::new(name, offset, ty, buffer, lock))
        };
    }
    match ty {
        PrimitiveType::I8 => mk!(i8),
        PrimitiveType::I16 => mk!(i16),
        PrimitiveType::I32 => mk!(i32),
        PrimitiveType::I64 => mk!(i64),
        PrimitiveType::U8 => mk!(u8),
        PrimitiveType::U16 => mk!(u16),
        PrimitiveType::U32 => mk!(u32),
        PrimitiveType::U64 => mk!(u64),
        PrimitiveType::F32 => mk!(f32),
        PrimitiveType::F64 => mk!(f64),
        PrimitiveType::Bool => mk!(bool),
    }
}

/// Compile a parsed state-vector config into a runnable [`StateVector`].
pub fn compile(parse: &SvParse) -> Result<StateVector, SvCompileError> {
    let mut seen_regions: HashMap<&str, usize> = HashMap::new();
    let mut seen_elements: HashMap<&str, usize> = HashMap::new();

    for region in &parse.regions {
        if let Some(&line) = seen_regions.get(region.plain_name.as_str()) {
            return Err(SvCompileError::DuplicateRegion(Diagnostic::new(
                "duplicate region",
                format!("region `{}` previously declared on line {line}", region.plain_name),
                region.name_token.position,
            )));
        }
        seen_regions.insert(&region.plain_name, region.name_token.position.line);

        if region.elements.is_empty() {
            return Err(SvCompileError::EmptyRegion(Diagnostic::new(
                "empty region",
                format!("region `{}` has no elements", region.plain_name),
                region.name_token.position,
            )));
        }

        for elem in &region.elements {
            let name = elem.name_token.lexeme.as_str();
            if let Some(&line) = seen_elements.get(name) {
                return Err(SvCompileError::DuplicateElement(Diagnostic::new(
                    "duplicate element",
                    format!("element `{name}` previously declared on line {line}"),
                    elem.name_token.position,
                )));
            }
            seen_elements.insert(name, elem.name_token.position.line);

            if PrimitiveType::from_name(&elem.type_token.lexeme).is_none() {
                return Err(SvCompileError::UnknownType(Diagnostic::new(
                    "unknown type",
                    format!("`{}` is not a known element type", elem.type_token.lexeme),
                    elem.type_token.position,
                )));
            }
        }
    }

    let total_bytes: usize = parse
        .regions
        .iter()
        .flat_map(|r| &r.elements)
        .map(|e| PrimitiveType::from_name(&e.type_token.lexeme).unwrap().size_bytes())
        .sum();

    let buffer = Rc::new(RefCell::new(vec![0u8; total_bytes]));
    let lock: Option<Rc<dyn Lock>> = if parse.lock {
        Some(Rc::new(MutexLock::new()))
    } else {
        None
    };

    let mut elements: HashMap<String, Rc<dyn ElementAccess>> = HashMap::new();
    let mut regions: HashMap<String, Region> = HashMap::new();
    let mut offset = 0usize;

    for region in &parse.regions {
        let region_start = offset;
        for elem in &region.elements {
            let ty = PrimitiveType::from_name(&elem.type_token.lexeme).unwrap();
            let handle = make_element(ty, &elem.name_token.lexeme, offset, buffer.clone(), lock.clone());
            elements.insert(elem.name_token.lexeme.clone(), handle.clone());
            if let Some(alias) = &elem.alias {
                elements.insert(alias.lexeme.clone(), handle);
            }
            offset += ty.size_bytes();
        }
        regions.insert(
            region.plain_name.clone(),
            Region::new(region.plain_name.clone(), region_start, offset - region_start, buffer.clone()),
        );
    }

    validate_layout(parse, &elements)?;

    log::debug!(
        "compiled state vector: {} region(s), {} element(s), {total_bytes} byte(s)",
        regions.len(),
        elements.len()
    );

    Ok(StateVector::new(buffer, elements, regions, lock))
}

/// Re-derive the layout from the element map and confirm it lands exactly on
/// each region's declared span — catches any bump-pointer arithmetic bug
/// before it becomes a silent out-of-bounds read.
fn validate_layout(parse: &SvParse, elements: &HashMap<String, Rc<dyn ElementAccess>>) -> Result<(), SvCompileError> {
    for region in &parse.regions {
        for elem in &region.elements {
            let name = &elem.name_token.lexeme;
            let handle = elements.get(name).ok_or_else(|| {
                SvCompileError::NullPointer(Diagnostic::new(
                    "missing element",
                    format!("element `{name}` was not allocated"),
                    elem.name_token.position,
                ))
            })?;
            if handle.primitive_type().size_bytes() == 0 {
                return Err(SvCompileError::Layout(Diagnostic::new(
                    "layout error",
                    format!("element `{name}` has zero size"),
                    elem.name_token.position,
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sv::parse::parse as parse_sv;
    use crate::tokenizer::tokenize;

    fn compile_str(src: &str) -> StateVector {
        let toks = tokenize(src).unwrap();
        let parsed = parse_sv(&toks, &[]).unwrap();
        compile(&parsed).unwrap()
    }

    #[test]
    fn elements_pack_contiguously() {
        let sv = compile_str("[A]\nI8 a\nI32 b\n");
        assert_eq!(sv.size_bytes(), 5);
        assert_eq!(sv.element_type("a").unwrap(), PrimitiveType::I8);
        assert_eq!(sv.element_type("b").unwrap(), PrimitiveType::I32);
    }

    #[test]
    fn region_spans_its_elements() {
        let sv = compile_str("[A]\nI8 a\nI32 b\n[B]\nF64 c\n");
        let a = sv.region("A").unwrap();
        assert_eq!(a.size(), 5);
        let b = sv.region("B").unwrap();
        assert_eq!(b.size(), 8);
    }

    #[test]
    fn alias_resolves_to_same_element() {
        let toks = tokenize("[A]\nF32 temp @alias degreesC\n").unwrap();
        let parsed = parse_sv(&toks, &[]).unwrap();
        let sv = compile(&parsed).unwrap();
        sv.element("degreesC").unwrap().write_f64(98.6);
        assert_eq!(sv.element("temp").unwrap().read_f64(), 98.6);
    }

    #[test]
    fn lock_option_produces_a_shared_lock() {
        let sv = compile_str("[options]\nlock\n[A]\nI32 x\n");
        assert!(sv.lock().is_some());
    }

    #[test]
    fn duplicate_region_is_rejected_at_compile_time() {
        let toks = tokenize("[A]\nI32 x\n[A]\nI32 y\n").unwrap();
        let parsed = parse_sv(&toks, &[]).unwrap();
        let err = compile(&parsed).unwrap_err();
        assert!(matches!(err, SvCompileError::DuplicateRegion(_)));
    }

    #[test]
    fn mixed_types_and_regions_lay_out_contiguously() {
        let src = "[Foo]\nI32 foo\nF64 bar\nbool baz\n[Bar]\nF32 qux\n";
        let sv = compile_str(src);

        let foo_region = sv.region("Foo").unwrap();
        let bar_region = sv.region("Bar").unwrap();
        assert_eq!(foo_region.size(), 13);
        assert_eq!(bar_region.size(), 4);

        let foo = sv.element("foo").unwrap();
        let bar = sv.element("bar").unwrap();
        let baz = sv.element("baz").unwrap();
        let qux = sv.element("qux").unwrap();

        assert_eq!(foo.offset(), 0);
        assert_eq!(bar.offset(), 4);
        assert_eq!(baz.offset(), 12);
        assert_eq!(qux.offset(), 13);

        for el in [foo, bar, baz, qux] {
            assert_eq!(el.read_f64(), 0.0);
        }
    }

    #[test]
    fn duplicate_element_is_rejected_at_compile_time() {
        let toks = tokenize("[A]\nI32 x\nF32 x\n").unwrap();
        let parsed = parse_sv(&toks, &[]).unwrap();
        let err = compile(&parsed).unwrap_err();
        assert!(matches!(err, SvCompileError::DuplicateElement(_)));
    }
}
