//! Browser import object
//!
//! Every C library and `sapi_*` function the module may import, wrapped as
//! a JS closure in the `env` namespace. Closures hold a weak adapter handle.
//! A fault raised inside an import is recorded on the adapter and thrown, so
//! the engine unwinds the module; the host side of the call picks the fault
//! back up from the adapter.

use super::abi::IMPORT_NAMESPACE;
use super::adapter::{Adapter, WeakAdapter};
use super::error::Fault;
use js_sys::{Object, Reflect};
use wasm_bindgen::prelude::*;

fn set(target: &Object, name: &str, value: &JsValue) -> Result<(), String> {
    Reflect::set(target, &JsValue::from_str(name), value)
        .map(|_| ())
        .map_err(|_| format!("failed to set {name} import"))
}

/// Unwrap an import result, throwing into the engine on a fault
fn settle<T>(adapter: &Adapter, result: Result<T, Fault>) -> T {
    match result {
        Ok(value) => value,
        Err(fault) => {
            let message = fault.to_string();
            adapter.record_fault(fault);
            wasm_bindgen::throw_str(&message)
        }
    }
}

fn upgrade(weak: &WeakAdapter) -> Adapter {
    match weak.upgrade() {
        Some(adapter) => adapter,
        None => wasm_bindgen::throw_str("extension adapter was dropped"),
    }
}

macro_rules! imports {
    ($env:expr, $weak:expr; $(
        $name:expr => |$adapter:ident $(, $arg:ident : $ty:ty)*| -> $ret:ty $body:block
    )*) => {
        $({
            let weak = $weak.clone();
            let closure = Closure::wrap(Box::new(move |$($arg: $ty),*| -> $ret {
                let $adapter = upgrade(&weak);
                let result: Result<$ret, Fault> = (|| $body)();
                settle(&$adapter, result)
            }) as Box<dyn Fn($($ty),*) -> $ret>);
            set($env, $name, closure.as_ref())?;
            closure.forget();
        })*
    };
}

/// Build `{ env: { memory, ...functions } }` for `adapter`
pub fn build(adapter: &Adapter) -> Result<Object, String> {
    let imports = Object::new();
    let env = Object::new();
    let weak = adapter.downgrade();

    let memory = adapter.state().memory.js_memory().clone();
    set(&env, "memory", &memory)?;

    add_libc(&env, &weak)?;
    add_sapi(&env, &weak)?;

    set(&imports, IMPORT_NAMESPACE, &env)?;
    Ok(imports)
}

fn add_libc(env: &Object, weak: &WeakAdapter) -> Result<(), String> {
    imports! { env, weak;
        // errno
        "__errno_location" => |a| -> u32 { a.libc().__errno_location() }
        "strerror" => |a, code: i32| -> u32 { a.libc().strerror(code) }
        "strsignal" => |a, sig: i32| -> u32 { a.libc().strsignal(sig) }

        // memory and strings
        "memcpy" => |a, d: u32, s: u32, n: u32| -> u32 { a.libc().memcpy(d, s, n) }
        "memmove" => |a, d: u32, s: u32, n: u32| -> u32 { a.libc().memmove(d, s, n) }
        "memset" => |a, d: u32, c: i32, n: u32| -> u32 { a.libc().memset(d, c, n) }
        "memcmp" => |a, x: u32, y: u32, n: u32| -> i32 { a.libc().memcmp(x, y, n) }
        "memchr" => |a, s: u32, c: i32, n: u32| -> u32 { a.libc().memchr(s, c, n) }
        "strlen" => |a, s: u32| -> u32 { a.libc().strlen(s) }
        "strcpy" => |a, d: u32, s: u32| -> u32 { a.libc().strcpy(d, s) }
        "strncpy" => |a, d: u32, s: u32, n: u32| -> u32 { a.libc().strncpy(d, s, n) }
        "strcat" => |a, d: u32, s: u32| -> u32 { a.libc().strcat(d, s) }
        "strncat" => |a, d: u32, s: u32, n: u32| -> u32 { a.libc().strncat(d, s, n) }
        "strcmp" => |a, x: u32, y: u32| -> i32 { a.libc().strcmp(x, y) }
        "strncmp" => |a, x: u32, y: u32, n: u32| -> i32 { a.libc().strncmp(x, y, n) }
        "strcoll" => |a, x: u32, y: u32| -> i32 { a.libc().strcoll(x, y) }
        "strxfrm" => |a, d: u32, s: u32, n: u32| -> u32 { a.libc().strxfrm(d, s, n) }
        "strdup" => |a, s: u32| -> u32 { a.libc().strdup(s) }
        "strndup" => |a, s: u32, n: u32| -> u32 { a.libc().strndup(s, n) }
        "strchr" => |a, s: u32, c: i32| -> u32 { a.libc().strchr(s, c) }
        "strrchr" => |a, s: u32, c: i32| -> u32 { a.libc().strrchr(s, c) }
        "strstr" => |a, h: u32, n: u32| -> u32 { a.libc().strstr(h, n) }
        "strspn" => |a, s: u32, set: u32| -> u32 { a.libc().strspn(s, set) }
        "strcspn" => |a, s: u32, set: u32| -> u32 { a.libc().strcspn(s, set) }
        "strpbrk" => |a, s: u32, set: u32| -> u32 { a.libc().strpbrk(s, set) }
        "strtok" => |a, s: u32, delim: u32| -> u32 { a.libc().strtok(s, delim) }

        // regex
        "regcomp" => |a, preg: u32, pattern: u32, flags: i32| -> i32 { a.libc().regcomp(preg, pattern, flags) }
        "regexec" => |a, preg: u32, s: u32, n: u32, m: u32, flags: i32| -> i32 {
            a.libc().regexec(preg, s, n, m, flags)
        }
        "regfree" => |a, preg: u32| -> () { a.libc().regfree(preg) }

        // allocation
        "malloc" => |a, size: u32| -> u32 { a.libc().malloc(size) }
        "calloc" => |a, count: u32, size: u32| -> u32 { a.libc().calloc(count, size) }
        "realloc" => |a, ptr: u32, size: u32| -> u32 { a.libc().realloc(ptr, size) }
        "free" => |a, ptr: u32| -> () { a.libc().free(ptr) }

        // conversion
        "atoi" => |a, s: u32| -> i32 { a.libc().atoi(s) }
        "atol" => |a, s: u32| -> i32 { a.libc().atol(s) }
        "atoll" => |a, s: u32| -> i64 { a.libc().atoll(s) }
        "atof" => |a, s: u32| -> f64 { a.libc().atof(s) }
        "strtol" => |a, s: u32, end: u32, base: i32| -> i32 { a.libc().strtol(s, end, base) }
        "strtoul" => |a, s: u32, end: u32, base: i32| -> u32 { a.libc().strtoul(s, end, base) }
        "strtoll" => |a, s: u32, end: u32, base: i32| -> i64 { a.libc().strtoll(s, end, base) }
        "strtoull" => |a, s: u32, end: u32, base: i32| -> u64 { a.libc().strtoull(s, end, base) }
        "strtod" => |a, s: u32, end: u32| -> f64 { a.libc().strtod(s, end) }
        "strtof" => |a, s: u32, end: u32| -> f32 { a.libc().strtof(s, end) }
        "abs" => |a, v: i32| -> i32 { Ok(a.libc().abs(v)) }
        "labs" => |a, v: i32| -> i32 { Ok(a.libc().labs(v)) }
        "llabs" => |a, v: i64| -> i64 { Ok(a.libc().llabs(v)) }
        "div" => |a, out: u32, n: i32, d: i32| -> () { a.libc().div(out, n, d) }
        "ldiv" => |a, out: u32, n: i32, d: i32| -> () { a.libc().ldiv(out, n, d) }
        "lldiv" => |a, out: u32, n: i64, d: i64| -> () { a.libc().lldiv(out, n, d) }
        "rand" => |a| -> i32 { a.libc().rand() }
        "srand" => |a, seed: u32| -> () { a.libc().srand(seed) }

        // environment
        "getenv" => |a, name: u32| -> u32 { a.libc().getenv(name) }
        "secure_getenv" => |a, name: u32| -> u32 { a.libc().secure_getenv(name) }
        "setenv" => |a, name: u32, value: u32, overwrite: i32| -> i32 { a.libc().setenv(name, value, overwrite) }
        "unsetenv" => |a, name: u32| -> i32 { a.libc().unsetenv(name) }
        "putenv" => |a, assignment: u32| -> i32 { a.libc().putenv(assignment) }
        "clearenv" => |a| -> i32 { a.libc().clearenv() }
        "system" => |a, command: u32| -> i32 { a.libc().system(command) }

        // process lifecycle
        "exit" => |a, code: i32| -> () { a.libc().exit(code) }
        "_Exit" => |a, code: i32| -> () { a.libc()._Exit(code) }
        "quick_exit" => |a, code: i32| -> () { a.libc().quick_exit(code) }
        "abort" => |a| -> () { a.libc().abort() }
        "atexit" => |a, callback: u32| -> i32 { a.libc().atexit(callback) }
        "at_quick_exit" => |a, callback: u32| -> i32 { a.libc().at_quick_exit(callback) }
        "__assert_fail" => |a, cond: u32, file: u32, line: u32, func: u32| -> () {
            a.libc().__assert_fail(cond, file, line, func)
        }

        // time
        "time" => |a, out: u32| -> i64 { a.libc().time(out) }
        "difftime" => |a, end: i64, begin: i64| -> f64 { Ok(a.libc().difftime(end, begin)) }
        "clock" => |a| -> i64 { a.libc().clock() }
        "clock_gettime" => |a, clock: i32, out: u32| -> i32 { a.libc().clock_gettime(clock, out) }
        "mktime" => |a, tm: u32| -> i64 { a.libc().mktime(tm) }
        "gmtime" => |a, timer: u32| -> u32 { a.libc().gmtime(timer) }
        "localtime" => |a, timer: u32| -> u32 { a.libc().localtime(timer) }
        "asctime" => |a, tm: u32| -> u32 { a.libc().asctime(tm) }
        "ctime" => |a, timer: u32| -> u32 { a.libc().ctime(timer) }
        "strftime" => |a, d: u32, n: u32, f: u32, tm: u32| -> u32 { a.libc().strftime(d, n, f, tm) }
        "nanosleep" => |a, req: u32, rem: u32| -> i32 { a.libc().nanosleep(req, rem) }

        // stdio
        "printf" => |a, fmt: u32, args: u32| -> i32 { a.libc().printf(fmt, args) }
        "vprintf" => |a, fmt: u32, args: u32| -> i32 { a.libc().vprintf(fmt, args) }
        "fprintf" => |a, s: u32, fmt: u32, args: u32| -> i32 { a.libc().fprintf(s, fmt, args) }
        "vfprintf" => |a, s: u32, fmt: u32, args: u32| -> i32 { a.libc().vfprintf(s, fmt, args) }
        "sprintf" => |a, d: u32, fmt: u32, args: u32| -> i32 { a.libc().sprintf(d, fmt, args) }
        "vsprintf" => |a, d: u32, fmt: u32, args: u32| -> i32 { a.libc().vsprintf(d, fmt, args) }
        "snprintf" => |a, d: u32, n: u32, fmt: u32, args: u32| -> i32 { a.libc().snprintf(d, n, fmt, args) }
        "vsnprintf" => |a, d: u32, n: u32, fmt: u32, args: u32| -> i32 { a.libc().vsnprintf(d, n, fmt, args) }
        "puts" => |a, s: u32| -> i32 { a.libc().puts(s) }
        "fputs" => |a, s: u32, stream: u32| -> i32 { a.libc().fputs(s, stream) }
        "fputc" => |a, c: i32, stream: u32| -> i32 { a.libc().fputc(c, stream) }
        "putchar" => |a, c: i32| -> i32 { a.libc().putchar(c) }
        "fflush" => |a, stream: u32| -> i32 { a.libc().fflush(stream) }
    }

    add_math(env, weak)
}

fn add_math(env: &Object, weak: &WeakAdapter) -> Result<(), String> {
    macro_rules! unary {
        ($($name:ident),*) => {
            imports! { env, weak;
                $(stringify!($name) => |a, x: f64| -> f64 { Ok(a.libc().$name(x)) })*
            }
        };
    }
    unary!(
        sin, cos, tan, asin, acos, atan, sinh, cosh, tanh, asinh, acosh, atanh, exp, exp2,
        expm1, log, log2, log10, log1p, sqrt, cbrt, fabs, ceil, floor, round, trunc, erf, erfc,
        tgamma, lgamma
    );

    imports! { env, weak;
        "atan2" => |a, y: f64, x: f64| -> f64 { Ok(a.libc().atan2(y, x)) }
        "pow" => |a, x: f64, y: f64| -> f64 { Ok(a.libc().pow(x, y)) }
        "hypot" => |a, x: f64, y: f64| -> f64 { Ok(a.libc().hypot(x, y)) }
        "fmod" => |a, x: f64, y: f64| -> f64 { Ok(a.libc().fmod(x, y)) }
        "fmin" => |a, x: f64, y: f64| -> f64 { Ok(a.libc().fmin(x, y)) }
        "fmax" => |a, x: f64, y: f64| -> f64 { Ok(a.libc().fmax(x, y)) }
        "copysign" => |a, x: f64, y: f64| -> f64 { Ok(a.libc().copysign(x, y)) }
        "ldexp" => |a, x: f64, e: i32| -> f64 { Ok(a.libc().ldexp(x, e)) }
        "frexp" => |a, x: f64, e: u32| -> f64 { a.libc().frexp(x, e) }
        "modf" => |a, x: f64, i: u32| -> f64 { a.libc().modf(x, i) }
    }
    Ok(())
}

fn add_sapi(env: &Object, weak: &WeakAdapter) -> Result<(), String> {
    imports! { env, weak;
        "sapi_log" => |a, ctx: u32, msg: u32| -> () { a.sapi().log(ctx, msg) }
        "sapi_debug" => |a, ctx: u32, msg: u32| -> () { a.sapi().debug(ctx, msg) }
        "sapi_rand64" => |a| -> u64 { Ok(a.sapi().rand64()) }

        "sapi_extension_is_allowed" => |a, ctx: u32, names: u32| -> bool { a.sapi().extension_is_allowed(ctx, names) }
        "sapi_extension_register" => |a, reg: u32| -> bool { a.sapi().extension_register(reg) }
        "sapi_extension_load" => |a, ctx: u32, name: u32, data: u32| -> bool { a.sapi().extension_load(ctx, name, data) }
        "sapi_extension_unload" => |a, ctx: u32, name: u32| -> bool { a.sapi().extension_unload(ctx, name) }
        "sapi_extension_get" => |a, ctx: u32, name: u32| -> u32 { a.sapi().extension_get(ctx, name) }

        "sapi_context_create" => |a, parent: u32, retained: bool| -> u32 { a.sapi().context_create(parent, retained) }
        "sapi_context_retain" => |a, ctx: u32| -> () { a.sapi().context_retain(ctx) }
        "sapi_context_retained" => |a, ctx: u32| -> bool { a.sapi().context_retained(ctx) }
        "sapi_context_release" => |a, ctx: u32| -> () { a.sapi().context_release(ctx) }
        "sapi_context_set_data" => |a, ctx: u32, data: u32| -> bool { a.sapi().context_set_data(ctx, data) }
        "sapi_context_get_data" => |a, ctx: u32| -> u32 { a.sapi().context_get_data(ctx) }
        "sapi_context_dispatch" => |a, ctx: u32, data: u32, cb: u32| -> bool { a.sapi().context_dispatch(ctx, data, cb) }
        "sapi_context_alloc" => |a, ctx: u32, size: u32| -> u32 { a.sapi().context_alloc(ctx, size) }
        "sapi_context_get_parent" => |a, ctx: u32| -> u32 { a.sapi().context_get_parent(ctx) }
        "sapi_context_get_loop" => |a, ctx: u32| -> u32 { a.sapi().context_get_loop(ctx) }
        "sapi_context_error_set_code" => |a, ctx: u32, code: i32| -> () { a.sapi().context_error_set_code(ctx, code) }
        "sapi_context_error_get_code" => |a, ctx: u32| -> i32 { a.sapi().context_error_get_code(ctx) }
        "sapi_context_error_set_name" => |a, ctx: u32, s: u32| -> () { a.sapi().context_error_set_name(ctx, s) }
        "sapi_context_error_get_name" => |a, ctx: u32| -> u32 { a.sapi().context_error_get_name(ctx) }
        "sapi_context_error_set_message" => |a, ctx: u32, s: u32| -> () { a.sapi().context_error_set_message(ctx, s) }
        "sapi_context_error_get_message" => |a, ctx: u32| -> u32 { a.sapi().context_error_get_message(ctx) }
        "sapi_context_error_set_location" => |a, ctx: u32, s: u32| -> () { a.sapi().context_error_set_location(ctx, s) }
        "sapi_context_error_get_location" => |a, ctx: u32| -> u32 { a.sapi().context_error_get_location(ctx) }
        "sapi_context_error_reset" => |a, ctx: u32| -> () { a.sapi().context_error_reset(ctx) }
        "sapi_context_config_get" => |a, ctx: u32, key: u32| -> u32 { a.sapi().context_config_get(ctx, key) }
        "sapi_context_config_set" => |a, ctx: u32, key: u32, value: u32| -> () { a.sapi().context_config_set(ctx, key, value) }
        "sapi_env_get" => |a, ctx: u32, name: u32| -> u32 { a.sapi().env_get(ctx, name) }

        "sapi_json_typeof" => |a, v: u32| -> i32 { a.sapi().json_typeof(v) }
        "sapi_json_object_create" => |a, ctx: u32| -> u32 { a.sapi().json_object_create(ctx) }
        "sapi_json_array_create" => |a, ctx: u32| -> u32 { a.sapi().json_array_create(ctx) }
        "sapi_json_string_create" => |a, ctx: u32, s: u32| -> u32 { a.sapi().json_string_create(ctx, s) }
        "sapi_json_boolean_create" => |a, ctx: u32, b: bool| -> u32 { a.sapi().json_boolean_create(ctx, b) }
        "sapi_json_number_create" => |a, ctx: u32, n: f64| -> u32 { a.sapi().json_number_create(ctx, n) }
        "sapi_json_raw_from" => |a, ctx: u32, s: u32| -> u32 { a.sapi().json_raw_from(ctx, s) }
        "sapi_json_object_set_value" => |a, o: u32, k: u32, v: u32| -> () { a.sapi().json_object_set_value(o, k, v) }
        "sapi_json_object_get" => |a, o: u32, k: u32| -> u32 { a.sapi().json_object_get(o, k) }
        "sapi_json_array_set_value" => |a, arr: u32, i: u32, v: u32| -> () { a.sapi().json_array_set_value(arr, i, v) }
        "sapi_json_array_get" => |a, arr: u32, i: u32| -> u32 { a.sapi().json_array_get(arr, i) }
        "sapi_json_array_push_value" => |a, arr: u32, v: u32| -> () { a.sapi().json_array_push_value(arr, v) }
        "sapi_json_array_pop" => |a, arr: u32| -> u32 { a.sapi().json_array_pop(arr) }
        "sapi_json_stringify_value" => |a, v: u32| -> u32 { a.sapi().json_stringify_value(v) }

        "sapi_ipc_message_get_index" => |a, m: u32| -> i32 { a.sapi().ipc_message_get_index(m) }
        "sapi_ipc_message_get_value" => |a, m: u32| -> u32 { a.sapi().ipc_message_get_value(m) }
        "sapi_ipc_message_get_bytes" => |a, m: u32| -> u32 { a.sapi().ipc_message_get_bytes(m) }
        "sapi_ipc_message_get_bytes_size" => |a, m: u32| -> u32 { a.sapi().ipc_message_get_bytes_size(m) }
        "sapi_ipc_message_get_name" => |a, m: u32| -> u32 { a.sapi().ipc_message_get_name(m) }
        "sapi_ipc_message_get_seq" => |a, m: u32| -> u32 { a.sapi().ipc_message_get_seq(m) }
        "sapi_ipc_message_get_uri" => |a, m: u32| -> u32 { a.sapi().ipc_message_get_uri(m) }
        "sapi_ipc_message_get" => |a, m: u32, k: u32| -> u32 { a.sapi().ipc_message_get(m, k) }
        "sapi_ipc_message_clone" => |a, ctx: u32, m: u32| -> u32 { a.sapi().ipc_message_clone(ctx, m) }

        "sapi_ipc_result_create" => |a, ctx: u32, m: u32| -> u32 { a.sapi().ipc_result_create(ctx, m) }
        "sapi_ipc_result_clone" => |a, ctx: u32, r: u32| -> u32 { a.sapi().ipc_result_clone(ctx, r) }
        "sapi_ipc_result_set_seq" => |a, r: u32, s: u32| -> () { a.sapi().ipc_result_set_seq(r, s) }
        "sapi_ipc_result_get_seq" => |a, r: u32| -> u32 { a.sapi().ipc_result_get_seq(r) }
        "sapi_ipc_result_get_context" => |a, r: u32| -> u32 { a.sapi().ipc_result_get_context(r) }
        "sapi_ipc_result_set_message" => |a, r: u32, m: u32| -> () { a.sapi().ipc_result_set_message(r, m) }
        "sapi_ipc_result_get_message" => |a, r: u32| -> u32 { a.sapi().ipc_result_get_message(r) }
        "sapi_ipc_result_set_json" => |a, r: u32, v: u32| -> () { a.sapi().ipc_result_set_json(r, v) }
        "sapi_ipc_result_get_json" => |a, r: u32| -> u32 { a.sapi().ipc_result_get_json(r) }
        "sapi_ipc_result_set_json_data" => |a, r: u32, v: u32| -> () { a.sapi().ipc_result_set_json_data(r, v) }
        "sapi_ipc_result_get_json_data" => |a, r: u32| -> u32 { a.sapi().ipc_result_get_json_data(r) }
        "sapi_ipc_result_set_json_error" => |a, r: u32, v: u32| -> () { a.sapi().ipc_result_set_json_error(r, v) }
        "sapi_ipc_result_get_json_error" => |a, r: u32| -> u32 { a.sapi().ipc_result_get_json_error(r) }
        "sapi_ipc_result_set_bytes" => |a, r: u32, n: u32, b: u32| -> () { a.sapi().ipc_result_set_bytes(r, n, b) }
        "sapi_ipc_result_get_bytes" => |a, r: u32| -> u32 { a.sapi().ipc_result_get_bytes(r) }
        "sapi_ipc_result_get_bytes_size" => |a, r: u32| -> u32 { a.sapi().ipc_result_get_bytes_size(r) }
        "sapi_ipc_result_set_header" => |a, r: u32, k: u32, v: u32| -> () { a.sapi().ipc_result_set_header(r, k, v) }
        "sapi_ipc_result_get_header" => |a, r: u32, k: u32| -> u32 { a.sapi().ipc_result_get_header(r, k) }
        "sapi_ipc_result_from_json" => |a, ctx: u32, m: u32, v: u32| -> u32 { a.sapi().ipc_result_from_json(ctx, m, v) }
        "sapi_ipc_reply" => |a, r: u32| -> bool { a.sapi().ipc_reply(r) }
        "sapi_ipc_reply_with_error" => |a, r: u32, e: u32| -> bool { a.sapi().ipc_reply_with_error(r, e) }

        "sapi_ipc_router_map" => |a, ctx: u32, route: u32, cb: u32, data: u32| -> bool {
            a.sapi().ipc_router_map(ctx, route, cb, data)
        }
        "sapi_ipc_router_unmap" => |a, ctx: u32, route: u32| -> bool { a.sapi().ipc_router_unmap(ctx, route) }
        "sapi_ipc_router_listen" => |a, ctx: u32, route: u32, cb: u32, data: u32| -> u64 {
            a.sapi().ipc_router_listen(ctx, route, cb, data)
        }
        "sapi_ipc_router_unlisten" => |a, ctx: u32, route: u32, token: u64| -> bool {
            a.sapi().ipc_router_unlisten(ctx, route, token)
        }
        "sapi_ipc_invoke" => |a, ctx: u32, url: u32, n: u32, b: u32, cb: u32| -> bool {
            a.sapi().ipc_invoke(ctx, url, n, b, cb)
        }
        "sapi_ipc_emit" => |a, ctx: u32, name: u32, data: u32| -> bool { a.sapi().ipc_emit(ctx, name, data) }
        "sapi_ipc_send_json" => |a, ctx: u32, m: u32, v: u32| -> bool { a.sapi().ipc_send_json(ctx, m, v) }
        "sapi_ipc_send_bytes" => |a, ctx: u32, m: u32, n: u32, b: u32, h: u32| -> bool {
            a.sapi().ipc_send_bytes(ctx, m, n, b, h)
        }

        "sapi_process_exec" => |a, ctx: u32, cmd: u32| -> u32 { a.sapi().process_exec(ctx, cmd) }
        "sapi_process_exec_get_exit_code" => |a, p: u32| -> i32 { a.sapi().process_exec_get_exit_code(p) }
        "sapi_process_exec_get_output" => |a, p: u32| -> u32 { a.sapi().process_exec_get_output(p) }
        "sapi_process_spawn" => |a, ctx: u32, cmd: u32, argv: u32, path: u32, out: u32, err: u32, exit: u32| -> u32 {
            a.sapi().process_spawn(ctx, cmd, argv, path, out, err, exit)
        }
        "sapi_process_spawn_get_exit_code" => |a, p: u32| -> i32 { a.sapi().process_spawn_get_exit_code(p) }
        "sapi_process_spawn_get_pid" => |a, p: u32| -> u32 { a.sapi().process_spawn_get_pid(p) }
        "sapi_process_spawn_get_context" => |a, p: u32| -> u32 { a.sapi().process_spawn_get_context(p) }
        "sapi_process_spawn_wait" => |a, p: u32| -> i32 { a.sapi().process_spawn_wait(p) }
        "sapi_process_spawn_write" => |a, p: u32, d: u32, n: u32| -> bool { a.sapi().process_spawn_write(p, d, n) }
        "sapi_process_spawn_close_stdin" => |a, p: u32| -> bool { a.sapi().process_spawn_close_stdin(p) }
        "sapi_process_spawn_kill" => |a, p: u32, sig: i32| -> bool { a.sapi().process_spawn_kill(p, sig) }
    }
    Ok(())
}
