use rstest::rstest;

use std::fs;

use crate::codegen::{OptLevel, TargetOptions};
use crate::*;

fn compile_with(source: &str, target: TargetOptions) -> String {
    let mut diags = Diagnostics::new("test.c");
    diags.set_quiet(true);
    let mut preprocessor = Preprocessor::new();
    let processed = preprocessor.process_source(source, &mut diags).unwrap();
    diags.set_source(processed.clone());
    let asm = compile_processed(&processed, "test.c", &target, &mut diags)
        .unwrap();
    assert_eq!(diags.error_count(), 0, "unexpected errors:\n{asm}");
    asm
}

fn compile(source: &str) -> String {
    compile_with(source, TargetOptions::default())
}

fn compile_err(source: &str) -> anyhow::Error {
    let mut diags = Diagnostics::new("test.c");
    diags.set_quiet(true);
    let mut preprocessor = Preprocessor::new();
    let processed = match preprocessor.process_source(source, &mut diags) {
        Ok(processed) => processed,
        Err(err) => return err,
    };
    diags.set_source(processed.clone());
    compile_processed(&processed, "test.c", &TargetOptions::default(), &mut diags)
        .expect_err("compilation should fail")
}

/// True when some output line is exactly `ins` or `ins ; comment`.
fn has_instruction(asm: &str, ins: &str) -> bool {
    asm.lines().any(|line| {
        let line = line.trim();
        line == ins || line.starts_with(&format!("{ins} ;"))
    })
}

fn count_lines(asm: &str, exact: &str) -> usize {
    asm.lines().filter(|line| line.trim() == exact).count()
}

fn offset_of(asm: &str, needle: &str) -> usize {
    asm.find(needle)
        .unwrap_or_else(|| panic!("missing '{needle}' in:\n{asm}"))
}

#[test]
fn header_directives_lead_the_file() {
    let asm = compile_with(
        "int main() { return 0; }",
        TargetOptions {
            origin: 0x100,
            ..Default::default()
        },
    );
    let mut lines = asm.lines();
    assert_eq!(lines.next(), Some("bits 16"));
    assert_eq!(lines.next(), Some("org 0x100"));
}

#[test]
fn minimal_program() {
    let asm = compile("int main() { return 0; }");
    assert_eq!(count_lines(&asm, "_main:"), 1);
    assert_eq!(count_lines(&asm, "_main_exit:"), 1);
    assert!(has_instruction(&asm, "push bp"));
    assert!(has_instruction(&asm, "mov bp, sp"));
    assert!(has_instruction(&asm, "mov ax, 0"));
    assert!(has_instruction(&asm, "jmp _main_exit"));
    assert!(has_instruction(&asm, "mov sp, bp"));
    assert!(has_instruction(&asm, "pop bp"));
    assert_eq!(count_lines(&asm, "ret"), 1);
}

#[test]
fn integer_literals_load_into_ax() {
    let asm = compile("int main() { return 42; }");
    assert!(has_instruction(&asm, "mov ax, 42"));

    let asm = compile("int main() { return 0x1F; }");
    assert!(has_instruction(&asm, "mov ax, 31"));
}

#[test]
fn string_global_emits_bytes_and_byte_load() {
    let asm =
        compile("char s[] = \"Hi\"; int main() { return s[0]; }");
    assert!(asm.contains("db 72, 105, 0"), "{asm}");
    assert!(has_instruction(&asm, "mov al, [bx]"));
    // base address computed before the byte load
    assert!(
        offset_of(&asm, "mov ax, _test_s") < offset_of(&asm, "mov al, [bx]")
    );
}

#[test]
fn naked_function_has_no_prologue_or_ret() {
    let asm = compile("[[naked]] void f() { __asm(\"hlt\"); }");
    assert_eq!(count_lines(&asm, "_f:"), 1);
    assert!(has_instruction(&asm, "hlt"));
    assert!(!has_instruction(&asm, "push bp"));
    assert!(!has_instruction(&asm, "mov sp, bp"));
    assert!(!has_instruction(&asm, "pop bp"));
    assert_eq!(count_lines(&asm, "ret"), 0);
}

#[test]
fn legacy_attribute_form() {
    let asm = compile("__attribute__((naked)) void f() { __asm(\"sti\"); }");
    assert!(!has_instruction(&asm, "push bp"));
    assert_eq!(count_lines(&asm, "ret"), 0);
}

#[test]
fn conditional_compilation_selects_one_global() {
    let asm = compile(
        "#define A 3\n#if A*2==6\nint x=1;\n#else\nint x=2;\n#endif\nint main() { return 0; }\n",
    );
    assert_eq!(count_lines(&asm, "_test_x:"), 1);
    assert!(has_instruction(&asm, "dw 1"));
    assert!(!has_instruction(&asm, "dw 2"));
}

#[test]
fn struct_members_use_distinct_word_slots() {
    let asm = compile(
        "struct P { int x; int y; };\n\
         int main() { struct P p; p.x = 1; p.y = 2; return p.x + p.y; }",
    );
    assert!(has_instruction(&asm, "mov [bp-4], ax"));
    assert!(has_instruction(&asm, "mov [bp-2], ax"));
    assert!(has_instruction(&asm, "mov ax, [bp-4]"));
    assert!(has_instruction(&asm, "mov ax, [bp-2]"));
    assert!(has_instruction(&asm, "add ax, bx"));
}

#[test]
fn sizeof_struct_is_member_sum() {
    let asm = compile(
        "struct P { int x; int y; };\n\
         int main() { return sizeof(struct P); }",
    );
    assert!(has_instruction(&asm, "mov ax, 4"));
}

#[rstest]
#[case("sizeof(int)", 2)]
#[case("sizeof(char)", 1)]
#[case("sizeof(long)", 4)]
#[case("sizeof(int*)", 2)]
#[case("sizeof(bool)", 1)]
fn sizeof_builtin_types(#[case] expr: &str, #[case] expected: i32) {
    let asm = compile(&format!("int main() {{ return {expr}; }}"));
    assert!(
        has_instruction(&asm, &format!("mov ax, {expected}")),
        "{expr}:\n{asm}"
    );
}

#[test]
fn word_pointer_indexing_scales_the_index() {
    let asm = compile("int f(int *p) { return *(p+1); }");
    let scale = offset_of(&asm, "shl bx, 1");
    let add = offset_of(&asm, "add ax, bx");
    assert!(scale < add);
    assert!(has_instruction(&asm, "mov ax, [bx]"));
}

#[test]
fn byte_pointer_indexing_does_not_scale() {
    let asm = compile("char f(char *p) { return *(p+1); }");
    assert!(!asm.contains("shl bx, 1"), "{asm}");
    assert!(has_instruction(&asm, "mov al, [bx]"));
}

#[test]
fn byte_store_through_char_pointer_uses_al() {
    let asm = compile("void f(char *p) { *p = 65; }");
    assert!(has_instruction(&asm, "mov [bx], al"));
    assert!(!has_instruction(&asm, "mov [bx], ax"));
}

#[test]
fn word_store_through_int_pointer_uses_ax() {
    let asm = compile("void f(int *p) { *p = 65; }");
    assert!(has_instruction(&asm, "mov [bx], ax"));
}

#[test]
fn parameters_load_from_positive_bp_offsets() {
    let asm = compile("int add(int a, int b) { return a + b; }");
    assert!(has_instruction(&asm, "mov ax, [bp+4]"));
    assert!(has_instruction(&asm, "mov ax, [bp+6]"));
}

#[test]
fn locals_use_negative_bp_offsets() {
    let asm = compile("int main() { int a = 1; int b = 2; return a + b; }");
    assert!(has_instruction(&asm, "mov ax, [bp-2]"));
    assert!(has_instruction(&asm, "mov ax, [bp-4]"));
}

#[test]
fn calls_push_arguments_right_to_left() {
    let asm = compile(
        "int add(int a, int b) { return a + b; }\n\
         int main() { return add(1, 2); }",
    );
    assert!(has_instruction(&asm, "call _add"));
    assert!(has_instruction(&asm, "add sp, 4"));
    let main_at = offset_of(&asm, "_main:");
    let second = asm[main_at..].find("mov ax, 2").unwrap();
    let first = asm[main_at..].find("mov ax, 1").unwrap();
    assert!(second < first, "arguments must be pushed right to left");
}

#[test]
fn zero_argument_call_skips_stack_cleanup() {
    let asm = compile(
        "int five() { return 5; }\n\
         int main() { return five(); }",
    );
    assert!(has_instruction(&asm, "call _five"));
    assert!(!asm.contains("add sp, 0"));
}

#[test]
fn string_literals_are_deferred_and_labeled() {
    let asm = compile(
        "int puts(char *s) { return 0; }\n\
         int main() { return puts(\"hello\"); }",
    );
    assert!(has_instruction(&asm, "mov ax, string_0"));
    assert!(asm.contains("string_0: db 104, 101, 108, 108, 111, 0"));
    // table flushed after the code, at file close
    assert!(offset_of(&asm, "call _puts") < offset_of(&asm, "string_0: db"));
}

#[test]
fn string_merging_only_at_o1() {
    let source = "int id(char *s) { return 0; }\n\
                  int main() { id(\"dup\"); id(\"dup\"); return 0; }";
    let merged = compile_with(
        source,
        TargetOptions {
            opt_level: OptLevel::Basic,
            ..Default::default()
        },
    );
    assert!(merged.contains("string_0:"));
    assert!(!merged.contains("string_1:"));

    let unmerged = compile(source);
    assert!(unmerged.contains("string_0:"));
    assert!(unmerged.contains("string_1:"));
}

#[test]
fn string_marker_pins_the_table() {
    let asm = compile(
        "int id(char *s) { return 0; }\n\
         int main() { return id(\"x\"); }\n\
         void _NCC_STRING_LOC() {}",
    );
    let marker = offset_of(&asm, "__NCC_STRING_LOC:");
    let table = offset_of(&asm, "string_0: db");
    assert!(table < marker, "table flushes just before the marker label");
    assert_eq!(count_lines(&asm, "string_0: db 120, 0 ; null terminator"), 1);
}

#[test]
fn array_marker_pins_zero_reservations() {
    let asm = compile(
        "int main() { int buf[8]; return 0; }\n\
         void _NCC_ARRAY_LOC() {}",
    );
    assert!(asm.contains("_buf: times 8 dw 0"));
    assert!(offset_of(&asm, "_buf: times") < offset_of(&asm, "__NCC_ARRAY_LOC:"));
}

#[test]
fn global_marker_pins_scalar_globals() {
    let asm = compile(
        "int counter = 7;\n\
         int main() { return counter; }\n\
         void _NCC_GLOBAL_LOC() {}",
    );
    assert!(asm.contains("_test_counter:"));
    assert!(has_instruction(&asm, "dw 7"));
    assert!(
        offset_of(&asm, "_test_counter:") < offset_of(&asm, "__NCC_GLOBAL_LOC:")
    );
}

#[test]
fn globals_flush_at_close_without_marker() {
    let asm = compile("int g = 3; char c; int main() { return g; }");
    assert!(asm.contains("_test_g:"));
    assert!(has_instruction(&asm, "dw 3"));
    assert!(asm.contains("_test_c:"));
    assert!(has_instruction(&asm, "db 0"));
    assert!(has_instruction(&asm, "mov ax, [_test_g]"));
}

#[test]
fn byte_global_loads_through_al() {
    let asm = compile("char g; int main() { return g; }");
    assert!(has_instruction(&asm, "mov al, [_test_g]"));
}

#[test]
fn initialized_array_pads_to_declared_size() {
    let asm = compile("int table[5] = {1, 2, 3}; int main() { return 0; }");
    assert!(asm.contains("_test_table:"));
    assert!(has_instruction(&asm, "dw 1, 2, 3"));
    assert!(has_instruction(&asm, "times 2 dw 0"));
}

#[test]
fn uninitialized_byte_array_reserves_bytes() {
    let asm = compile("char buf[16]; int main() { return 0; }");
    assert!(asm.contains("_buf: times 16 db 0"));
}

#[test]
fn if_else_branches_and_labels() {
    let asm = compile(
        "int main() { int x = 1; if (x) { x = 2; } else { x = 3; } return x; }",
    );
    assert!(has_instruction(&asm, "test ax, ax"));
    assert!(asm.contains("jz if_else"));
    assert!(asm.contains("jmp if_end"));
}

#[test]
fn while_loop_shape() {
    let asm = compile(
        "int main() { int i = 0; while (i < 3) { i = i + 1; } return i; }",
    );
    assert!(asm.contains("while_cond"));
    assert!(asm.contains("jz while_end"));
    assert!(asm.contains("jmp while_cond"));
}

#[test]
fn do_while_tests_after_the_body() {
    let asm =
        compile("int main() { int i = 0; do { i = i + 1; } while (i < 3); return i; }");
    let body = offset_of(&asm, "do_body");
    let cond = offset_of(&asm, "do_cond");
    assert!(body < cond);
    assert!(asm.contains("jnz do_body"));
}

#[test]
fn for_loop_shape() {
    let asm = compile(
        "int main() { int s = 0; for (int i = 0; i < 4; i = i + 1) { s = s + i; } return s; }",
    );
    assert!(asm.contains("jmp for_cond"));
    assert!(asm.contains("jnz for_start"));
    assert!(asm.contains("for_update"));
}

#[test]
fn comparisons_materialize_booleans_without_setcc() {
    let asm = compile("int f(int a, int b) { return a < b; }");
    assert!(has_instruction(&asm, "cmp ax, bx"));
    assert!(asm.contains("jl lt_true_"));
    assert!(has_instruction(&asm, "mov ax, 1"));
    assert!(!asm.contains("setl"));
}

#[test]
fn logical_operators_short_circuit() {
    let asm = compile("int f(int a, int b) { return a && b; }");
    assert!(asm.contains("land_false"));
    assert!(asm.contains("jz land_false"));

    let asm = compile("int f(int a, int b) { return a || b; }");
    assert!(asm.contains("lor_true"));
    assert!(asm.contains("jnz lor_true"));
}

#[test]
fn ternary_emits_both_branches() {
    let asm = compile("int f(int c) { return c ? 10 : 20; }");
    assert!(asm.contains("tern_else"));
    assert!(has_instruction(&asm, "mov ax, 10"));
    assert!(has_instruction(&asm, "mov ax, 20"));
}

#[rstest]
#[case("x += 2", "add ax, bx")]
#[case("x -= 2", "sub ax, bx")]
#[case("x *= 2", "imul bx")]
#[case("x /= 2", "idiv bx")]
#[case("x <<= 2", "shl ax, cl")]
#[case("x >>= 2", "sar ax, cl")]
fn compound_assignment_operators(#[case] stmt: &str, #[case] expected: &str) {
    let asm = compile(&format!("int main() {{ int x = 8; {stmt}; return x; }}"));
    assert!(has_instruction(&asm, expected), "{stmt}:\n{asm}");
}

#[test]
fn unsigned_division_uses_div() {
    let asm = compile("unsigned int f(unsigned int a) { return a / 3; }");
    assert!(has_instruction(&asm, "div bx"));
    assert!(!has_instruction(&asm, "idiv bx"));

    let signed = compile("int f(int a) { return a / 3; }");
    assert!(has_instruction(&signed, "cwd"));
    assert!(has_instruction(&signed, "idiv bx"));
}

#[test]
fn modulo_moves_remainder_from_dx() {
    let asm = compile("int f(int a) { return a % 3; }");
    assert!(has_instruction(&asm, "mov ax, dx"));
}

#[test]
fn increment_and_decrement() {
    let asm = compile("int main() { int i = 0; i++; --i; return i; }");
    assert!(has_instruction(&asm, "add ax, 1"));
    assert!(has_instruction(&asm, "sub ax, 1"));
    // postfix preserves the old value across the store
    assert!(has_instruction(&asm, "push ax"));
}

#[test]
fn pointer_increment_steps_by_element_size() {
    let asm = compile("void f(int *p) { p++; }");
    assert!(has_instruction(&asm, "add ax, 2"));
}

#[test]
fn far_pointer_literal_loads_segment_and_offset() {
    let asm = compile("int main() { int __far *p; p = 0xB800:0x0000; return 0; }");
    assert!(has_instruction(&asm, "mov dx, 0xB800"));
    assert!(has_instruction(&asm, "mov ax, 0x0000"));
}

#[test]
fn far_pointer_store_swaps_data_segment() {
    let asm =
        compile("void f() { int __far *p; p = 0xB800:0; *p = 65; }");
    assert!(has_instruction(&asm, "push ds"));
    assert!(has_instruction(&asm, "mov ds, dx"));
    assert!(has_instruction(&asm, "pop ds"));
}

#[test]
fn address_of_local_uses_lea() {
    let asm = compile("int main() { int x = 5; int *p; p = &x; return *p; }");
    assert!(has_instruction(&asm, "lea ax, [bp-2]"));
}

#[test]
fn struct_pointer_member_access_adds_offset() {
    let asm = compile(
        "struct P { int x; int y; };\n\
         int f(struct P *p) { return p->y; }",
    );
    assert!(has_instruction(&asm, "add ax, 2"));
    assert!(has_instruction(&asm, "mov ax, [bx]"));
}

#[test]
fn cast_extends_and_truncates() {
    let asm = compile("int f(char c) { return (int)c; }");
    assert!(has_instruction(&asm, "cbw"));

    let asm = compile("unsigned int f(unsigned char c) { return (unsigned int)c; }");
    assert!(has_instruction(&asm, "and ax, 0x00FF"));
}

#[test]
fn comma_operator_keeps_right_value() {
    let asm = compile("int main() { int x; x = (1, 2); return x; }");
    assert!(has_instruction(&asm, "mov ax, 1"));
    assert!(has_instruction(&asm, "mov ax, 2"));
    // no push/pop pairing around the comma
    let comma_first = offset_of(&asm, "mov ax, 1");
    let comma_second = offset_of(&asm, "mov ax, 2");
    assert!(comma_first < comma_second);
}

#[test]
fn stackframe_function_preserves_registers() {
    let asm = compile("__stackframe int f() { return 1; }");
    for reg in ["bx", "cx", "dx", "si", "di"] {
        assert!(has_instruction(&asm, &format!("push {reg}")), "{asm}");
        assert!(has_instruction(&asm, &format!("pop {reg}")), "{asm}");
    }
    assert_eq!(count_lines(&asm, "ret"), 1);
}

#[test]
fn system_mode_sets_stack_and_jumps() {
    let asm = compile_with(
        "void _after_diskload() { }",
        TargetOptions {
            origin: 0x7C00,
            system_mode: true,
            stack: Some((0x9000, 0xFFFE)),
            ..Default::default()
        },
    );
    assert_eq!(asm.lines().nth(1), Some("org 0x7C00"));
    assert!(has_instruction(&asm, "mov ax, 0x9000"));
    assert!(has_instruction(&asm, "mov ss, ax"));
    assert!(has_instruction(&asm, "mov sp, 0xFFFE"));
    assert!(has_instruction(&asm, "jmp _after_diskload"));
}

#[test]
fn asm_block_collects_raw_tokens() {
    let asm = compile("void f() { __asm { cli hlt }; }");
    assert!(asm.contains("cli hlt"));
}

#[test]
fn extended_asm_emits_template_verbatim() {
    let asm = compile(
        "void f() { int x = 1; __asm(\"mov ax, %0\" : : \"r\"(x)); }",
    );
    assert!(has_instruction(&asm, "mov ax, %0"));
}

#[test]
fn deprecated_call_warns() {
    let mut diags = Diagnostics::new("test.c");
    diags.set_quiet(true);
    let source = "[[deprecated(\"use g\")]] void f() { }\n\
                  int main() { f(); return 0; }";
    let mut preprocessor = Preprocessor::new();
    let processed = preprocessor.process_source(source, &mut diags).unwrap();
    diags.set_source(processed.clone());
    compile_processed(&processed, "test.c", &TargetOptions::default(), &mut diags)
        .unwrap();
    assert_eq!(diags.error_count(), 0);
    assert!(diags.warning_count() >= 1);
}

#[test]
fn static_local_warns_and_is_ignored() {
    let mut diags = Diagnostics::new("test.c");
    diags.set_quiet(true);
    let source = "int main() { static int x = 1; return x; }";
    let mut preprocessor = Preprocessor::new();
    let processed = preprocessor.process_source(source, &mut diags).unwrap();
    diags.set_source(processed.clone());
    compile_processed(&processed, "test.c", &TargetOptions::default(), &mut diags)
        .unwrap();
    assert!(diags.warning_count() >= 1);
}

#[test]
fn void_object_declarations_are_rejected() {
    compile_err("int f(void x) { return 0; }");
    compile_err("int main() { void v; return 0; }");
}

#[test]
fn void_pointer_store_is_rejected() {
    let err = compile_err("void f(void *p) { *p = 1; }");
    assert!(err.to_string().contains("void pointer"), "{err}");
}

#[test]
fn duplicate_struct_is_rejected() {
    let err = compile_err("struct S { int a; }; struct S { int b; };");
    assert!(err.to_string().contains("duplicate"), "{err}");
}

#[test]
fn unknown_struct_type_is_rejected() {
    compile_err("int main() { struct Nope n; return 0; }");
}

#[test]
fn preprocessing_twice_is_idempotent() {
    let source = "int main() {\n    return 1 + 2;\n}\n";
    let mut diags = Diagnostics::new("test.c");
    diags.set_quiet(true);
    let once = Preprocessor::new()
        .process_source(source, &mut diags)
        .unwrap();
    let twice = Preprocessor::new()
        .process_source(&once, &mut diags)
        .unwrap();
    assert_eq!(once, twice);
}

#[test]
fn include_splices_and_pragma_once_deduplicates() {
    let dir = std::env::temp_dir().join(format!(
        "ncc-include-test-{}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).unwrap();
    let header = dir.join("defs.h");
    fs::write(&header, "#pragma once\n#define VALUE 9\nint shared = VALUE;\n")
        .unwrap();
    let main_path = dir.join("prog.c");
    fs::write(
        &main_path,
        "#include \"defs.h\"\n#include \"defs.h\"\nint main() { return shared; }\n",
    )
    .unwrap();

    let mut diags = Diagnostics::new(main_path.display().to_string());
    diags.set_quiet(true);
    let mut preprocessor = Preprocessor::new();
    preprocessor.add_include_path(&dir);
    let processed = preprocessor
        .process_file(&main_path, &mut diags)
        .unwrap();

    assert_eq!(processed.matches("int shared = 9;").count(), 1);
    assert!(processed.contains("int main()"));

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn missing_include_is_fatal() {
    let mut diags = Diagnostics::new("test.c");
    diags.set_quiet(true);
    let result = Preprocessor::new()
        .process_source("#include \"no-such-file.h\"\n", &mut diags);
    assert!(result.is_err());
}

#[test]
fn label_identifiers_are_unique() {
    let asm = compile(
        "int main() { int i = 0; while (i < 2) { if (i) { i = 2; } i = i + 1; } return i; }",
    );
    let mut labels: Vec<&str> = asm
        .lines()
        .filter(|line| {
            !line.starts_with(' ')
                && line.ends_with(':')
                && !line.starts_with(';')
        })
        .collect();
    let total = labels.len();
    labels.sort_unstable();
    labels.dedup();
    assert_eq!(total, labels.len(), "duplicate label in:\n{asm}");
}

#[test]
fn exit_label_emitted_once_per_function() {
    let asm = compile(
        "int a() { return 1; }\n\
         int b() { return 2; }\n\
         int main() { return a() + b(); }",
    );
    for name in ["a", "b", "main"] {
        assert_eq!(count_lines(&asm, &format!("_{name}:")), 1);
        assert_eq!(count_lines(&asm, &format!("_{name}_exit:")), 1);
    }
    assert_eq!(count_lines(&asm, "ret"), 3);
}

#[test]
fn variadic_parameter_list_parses() {
    let asm = compile("int f(int first, ...) { return first; }\n\
                       int main() { return f(1, 2, 3); }");
    assert!(has_instruction(&asm, "add sp, 6"));
}

#[test]
fn line_mappings_cover_the_unit() {
    let dir = std::env::temp_dir().join(format!(
        "ncc-lines-test-{}",
        std::process::id()
    ));
    fs::create_dir_all(&dir).unwrap();
    let header = dir.join("one.h");
    fs::write(&header, "int from_header;\n").unwrap();
    let main_path = dir.join("prog.c");
    fs::write(&main_path, "#include \"one.h\"\nint main() { return 0; }\n")
        .unwrap();

    let mut diags = Diagnostics::new(main_path.display().to_string());
    diags.set_quiet(true);
    let mut preprocessor = Preprocessor::new();
    preprocessor.add_include_path(&dir);
    preprocessor.process_file(&main_path, &mut diags).unwrap();

    let segments = preprocessor.line_segments();
    assert!(segments.iter().any(|s| s.file.ends_with("one.h")));
    assert!(segments.iter().any(|s| s.file.ends_with("prog.c")));

    fs::remove_dir_all(&dir).unwrap();
}
