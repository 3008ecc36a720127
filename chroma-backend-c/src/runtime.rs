#![forbid(unsafe_code)]

//! `chroma_runtime.h`: value types and the `builtins`, `operator` and
//! `rawbuffer` functions that emitted modules call.

/// Modules whose functions are defined by the runtime header.
pub(crate) const RUNTIME_MODULES: [&str; 3] = ["builtins", "operator", "rawbuffer"];

pub(crate) fn emit_runtime_h() -> String {
    let mut out = String::new();
    out.push_str("#pragma once\n");
    out.push_str("#include <math.h>\n");
    out.push_str("#include <stdbool.h>\n");
    out.push_str("#include <stdint.h>\n");
    out.push_str("#include <stdio.h>\n");
    out.push_str("#include <stdlib.h>\n");
    out.push_str("#include <string.h>\n\n");

    out.push_str("typedef struct chroma_Str { int32_t length; const char *utf8; } chroma_Str;\n");
    out.push_str("typedef struct chroma_RawBuffer { int32_t length; uint8_t *bytes; } chroma_RawBuffer;\n\n");

    out.push_str("static inline void chroma_panic(const char *msg) {\n");
    out.push_str("  fprintf(stderr, \"PanicError: %s\\n\", msg);\n");
    out.push_str("  fflush(stderr);\n");
    out.push_str("  abort();\n");
    out.push_str("}\n\n");

    out.push_str("// ---- builtins ----\n\n");
    out.push_str("static inline int32_t chroma_builtins$abs(int32_t x) {\n");
    out.push_str("  return x < 0 ? (int32_t)(0u - (uint32_t)x) : x;\n");
    out.push_str("}\n\n");
    out.push_str("static inline void chroma_builtins$print_i32(int32_t x) { printf(\"%d\\n\", x); }\n");
    out.push_str("static inline void chroma_builtins$print_f64(double x) { printf(\"%.17g\\n\", x); }\n");
    out.push_str("static inline void chroma_builtins$print_bool(bool x) { puts(x ? \"True\" : \"False\"); }\n");
    out.push_str("static inline void chroma_builtins$print_str(chroma_Str *s) {\n");
    out.push_str("  printf(\"%.*s\\n\", (int)s->length, s->utf8);\n");
    out.push_str("}\n");
    out.push_str("static inline void chroma_builtins$print_void(void) { puts(\"None\"); }\n\n");

    out.push_str("// ---- operator ----\n\n");
    // floor division, like the interpreter
    out.push_str("static inline int32_t chroma_operator$i32_div(int32_t a, int32_t b) {\n");
    out.push_str("  if (b == 0) chroma_panic(\"division by zero\");\n");
    out.push_str("  if (a == INT32_MIN && b == -1) return INT32_MIN;\n");
    out.push_str("  int32_t q = a / b;\n");
    out.push_str("  if ((a % b != 0) && ((a < 0) != (b < 0))) q -= 1;\n");
    out.push_str("  return q;\n");
    out.push_str("}\n\n");
    out.push_str("static inline double chroma_operator$f64_div(double a, double b) {\n");
    out.push_str("  if (b == 0.0) chroma_panic(\"division by zero\");\n");
    out.push_str("  return a / b;\n");
    out.push_str("}\n\n");
    out.push_str("static inline chroma_Str *chroma_str_alloc(int32_t length) {\n");
    out.push_str("  chroma_Str *s = malloc(sizeof(chroma_Str) + (size_t)length + 1);\n");
    out.push_str("  if (!s) chroma_panic(\"out of memory\");\n");
    out.push_str("  s->length = length;\n");
    out.push_str("  s->utf8 = (const char *)(s + 1);\n");
    out.push_str("  return s;\n");
    out.push_str("}\n\n");
    out.push_str("static inline chroma_Str *chroma_operator$str_add(chroma_Str *a, chroma_Str *b) {\n");
    out.push_str("  chroma_Str *s = chroma_str_alloc(a->length + b->length);\n");
    out.push_str("  char *buf = (char *)(s + 1);\n");
    out.push_str("  memcpy(buf, a->utf8, (size_t)a->length);\n");
    out.push_str("  memcpy(buf + a->length, b->utf8, (size_t)b->length);\n");
    out.push_str("  buf[s->length] = 0;\n");
    out.push_str("  return s;\n");
    out.push_str("}\n\n");
    out.push_str("static inline chroma_Str *chroma_operator$str_mul(chroma_Str *a, int32_t n) {\n");
    out.push_str("  if (n < 0) n = 0;\n");
    out.push_str("  chroma_Str *s = chroma_str_alloc(a->length * n);\n");
    out.push_str("  char *buf = (char *)(s + 1);\n");
    out.push_str("  for (int32_t i = 0; i < n; i++) memcpy(buf + i * a->length, a->utf8, (size_t)a->length);\n");
    out.push_str("  buf[s->length] = 0;\n");
    out.push_str("  return s;\n");
    out.push_str("}\n\n");
    out.push_str("static inline bool chroma_operator$str_eq(chroma_Str *a, chroma_Str *b) {\n");
    out.push_str("  return a->length == b->length && memcmp(a->utf8, b->utf8, (size_t)a->length) == 0;\n");
    out.push_str("}\n");
    out.push_str("static inline bool chroma_operator$str_ne(chroma_Str *a, chroma_Str *b) {\n");
    out.push_str("  return !chroma_operator$str_eq(a, b);\n");
    out.push_str("}\n\n");

    out.push_str("// ---- rawbuffer (little-endian hosts) ----\n\n");
    out.push_str("static inline chroma_RawBuffer *chroma_rawbuffer$rb_alloc(int32_t size) {\n");
    out.push_str("  if (size < 0) chroma_panic(\"negative buffer size\");\n");
    out.push_str("  chroma_RawBuffer *rb = malloc(sizeof(chroma_RawBuffer));\n");
    out.push_str("  uint8_t *bytes = calloc((size_t)size + 1, 1);\n");
    out.push_str("  if (!rb || !bytes) chroma_panic(\"out of memory\");\n");
    out.push_str("  rb->length = size;\n");
    out.push_str("  rb->bytes = bytes;\n");
    out.push_str("  return rb;\n");
    out.push_str("}\n\n");
    out.push_str("static inline uint8_t *chroma_rb_slot(chroma_RawBuffer *rb, int32_t offset, int32_t size) {\n");
    out.push_str("  if (offset < 0 || offset > rb->length - size) chroma_panic(\"buffer access out of bounds\");\n");
    out.push_str("  return rb->bytes + offset;\n");
    out.push_str("}\n\n");
    for (ty, ctype, size) in [("i32", "int32_t", 4), ("f64", "double", 8)] {
        out.push_str(&format!(
            "static inline void chroma_rawbuffer$rb_set_{ty}(chroma_RawBuffer *rb, int32_t offset, {ctype} v) {{\n"
        ));
        out.push_str(&format!("  memcpy(chroma_rb_slot(rb, offset, {size}), &v, {size});\n"));
        out.push_str("}\n");
        out.push_str(&format!(
            "static inline {ctype} chroma_rawbuffer$rb_get_{ty}(chroma_RawBuffer *rb, int32_t offset) {{\n"
        ));
        out.push_str(&format!("  {ctype} v;\n"));
        out.push_str(&format!("  memcpy(&v, chroma_rb_slot(rb, offset, {size}), {size});\n"));
        out.push_str("  return v;\n");
        out.push_str("}\n\n");
    }
    out
}
