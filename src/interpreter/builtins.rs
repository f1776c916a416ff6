use std::cmp::Ordering;
use std::io::Write;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::ErrorKind;

use super::value::{DictKey, DictRef, ListRef, Native, Number, OpError, OpResult, Value, ValueKind};
use super::Interpreter;

/// Host-provided functions receive already-evaluated values; any failure they
/// report surfaces as a FunctionError with the message as details.
pub type NativeFn = fn(&mut Interpreter, &[Value]) -> Result<Value, String>;

type NativeResult = Result<Value, String>;

fn native(name: &'static str, func: NativeFn) -> Value {
    Value::new(ValueKind::Native(Rc::new(Native { name, func })))
}

/// Inject the builtin table and the `__System_*` constants into the global
/// scope.
pub fn install(interpreter: &mut Interpreter) {
    let global = interpreter.global;
    let max_depth = interpreter.max_depth;
    let scopes = &mut interpreter.scopes;

    scopes.set(global, "__System_maxrecursion", Value::int(max_depth as i64));
    scopes.set(global, "__System_maxsize", Value::int(i64::MAX));
    scopes.set(global, "__System_maxunicode", Value::int(char::MAX as i64));
    scopes.set(
        global,
        "__System_platform",
        Value::str(std::env::consts::OS),
    );
    scopes.set(
        global,
        "__System_interpreter",
        Value::str(
            std::env::current_exe()
                .map(|path| path.to_string_lossy().to_string())
                .unwrap_or_else(|_| "kst".to_string()),
        ),
    );

    scopes.set(global, "inf", Value::float(f64::INFINITY));
    scopes.set(global, "nan", Value::float(f64::NAN));

    for &(name, func) in TABLE {
        scopes.set(global, name, native(name, func));
    }
}

/// The builtin registry, name to native function.
const TABLE: &[(&str, NativeFn)] = &[
    ("print", print),
    ("printf", printf),
    ("printe", printe),
    ("input", input),
    ("int", to_int),
    ("float", to_float),
    ("str", to_str),
    ("string", to_repr),
    ("list", to_list),
    ("typeof", type_of),
    ("ord", ord),
    ("char", chr),
    ("bin", bin),
    ("oct", oct),
    ("hex", hex),
    ("defined_var", defined_var),
    ("len", len),
    ("range", range),
    ("append", append),
    ("extend", extend),
    ("remove", remove),
    ("clear", clear),
    ("reverse", reverse),
    ("sort", sort),
    ("poplist", poplist),
    ("popdict", popdict),
    ("sum", sum),
    ("join", join),
    ("index", index_of),
    ("count", count),
    ("enum", enumerate),
    ("zip_short", zip_short),
    ("zip_long", zip_long),
    ("slice", slice),
    ("getitem", getitem),
    ("setitem", setitem),
    ("delitem", delitem),
    ("copy", shallow_copy),
    ("deepcopy", deep_copy),
    ("replace", replace),
    ("strip", strip),
    ("lstrip", lstrip),
    ("rstrip", rstrip),
    ("split", split),
    ("find", find),
    ("startswith", startswith),
    ("endswith", endswith),
    ("keys", keys),
    ("values", values),
    ("items", items),
    ("getdefault", getdefault),
    ("setdefault", setdefault),
    ("ternary", ternary),
    ("globals", globals),
    ("read", read_file),
    ("write", write_file),
    ("system", system),
];

fn arity(name: &str, args: &[Value], expected: usize) -> Result<(), String> {
    if args.len() != expected {
        return Err(format!(
            "{name}() takes {expected} arguments, got {}",
            args.len()
        ));
    }
    Ok(())
}

fn arity_between(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), String> {
    if args.len() < min || args.len() > max {
        return Err(format!(
            "{name}() takes {min} to {max} arguments, got {}",
            args.len()
        ));
    }
    Ok(())
}

fn want_str<'a>(name: &str, args: &'a [Value], at: usize) -> Result<&'a str, String> {
    match args.get(at).map(|value| &value.kind) {
        Some(ValueKind::Str(value)) => Ok(value),
        _ => Err(format!("{name}() expects a string argument")),
    }
}

fn want_int(name: &str, args: &[Value], at: usize) -> Result<i64, String> {
    match args.get(at).map(|value| &value.kind) {
        Some(ValueKind::Number(Number::Int(value))) => Ok(*value),
        _ => Err(format!("{name}() expects an integer argument")),
    }
}

fn want_list<'a>(name: &str, args: &'a [Value], at: usize) -> Result<&'a ListRef, String> {
    match args.get(at).map(|value| &value.kind) {
        Some(ValueKind::List(items)) => Ok(items),
        _ => Err(format!("{name}() expects a list argument")),
    }
}

fn want_dict<'a>(name: &str, args: &'a [Value], at: usize) -> Result<&'a DictRef, String> {
    match args.get(at).map(|value| &value.kind) {
        Some(ValueKind::Dict(items)) => Ok(items),
        _ => Err(format!("{name}() expects a dict argument")),
    }
}

fn joined(args: &[Value]) -> String {
    args.iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn print(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    println!("{}", joined(args));
    Ok(Value::null())
}

fn printf(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    print!("{}", joined(args));
    std::io::stdout().flush().map_err(|err| err.to_string())?;
    Ok(Value::null())
}

fn printe(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("printe", args, 2)?;
    print!("{}{}", args[0], args[1]);
    std::io::stdout().flush().map_err(|err| err.to_string())?;
    Ok(Value::null())
}

fn input(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity_between("input", args, 0, 1)?;
    if let Some(prompt) = args.first() {
        print!("{prompt}");
        std::io::stdout().flush().map_err(|err| err.to_string())?;
    }
    let mut line = String::new();
    let read = std::io::stdin()
        .read_line(&mut line)
        .map_err(|err| err.to_string())?;
    if read == 0 {
        return Err("EOF when reading a line".to_string());
    }
    Ok(Value::str(line.trim_end_matches(['\n', '\r'])))
}

fn to_int(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("int", args, 1)?;
    match &args[0].kind {
        ValueKind::Number(Number::Int(value)) => Ok(Value::int(*value)),
        ValueKind::Number(Number::Float(value)) => Ok(Value::int(*value as i64)),
        ValueKind::Bool(value) => Ok(Value::int(*value as i64)),
        ValueKind::Str(value) => value
            .trim()
            .parse::<i64>()
            .map(Value::int)
            .map_err(|_| format!("invalid literal for int: '{value}'")),
        _ => Err(format!("cannot convert {} to int", args[0].kind_name())),
    }
}

fn to_float(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("float", args, 1)?;
    match &args[0].kind {
        ValueKind::Number(number) => Ok(Value::float(number.as_f64())),
        ValueKind::Bool(value) => Ok(Value::float(*value as i64 as f64)),
        ValueKind::Str(value) => value
            .trim()
            .parse::<f64>()
            .map(Value::float)
            .map_err(|_| format!("invalid literal for float: '{value}'")),
        _ => Err(format!("cannot convert {} to float", args[0].kind_name())),
    }
}

fn to_str(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("str", args, 1)?;
    Ok(Value::str(args[0].to_string()))
}

fn to_repr(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("string", args, 1)?;
    Ok(Value::str(args[0].repr()))
}

fn to_list(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("list", args, 1)?;
    match &args[0].kind {
        ValueKind::Str(value) => Ok(Value::list(
            value.chars().map(|c| Value::str(c.to_string())).collect(),
        )),
        ValueKind::List(items) => Ok(Value::list(items.borrow().clone())),
        ValueKind::Dict(items) => Ok(Value::list(
            items.borrow().keys().map(DictKey::to_value).collect(),
        )),
        _ => Err(format!("cannot convert {} to list", args[0].kind_name())),
    }
}

fn type_of(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("typeof", args, 1)?;
    Ok(Value::str(args[0].kind_name()))
}

fn ord(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("ord", args, 1)?;
    let value = want_str("ord", args, 0)?;
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Value::int(c as i64)),
        _ => Err(format!(
            "ord() expects a single character, got a string of length {}",
            value.chars().count()
        )),
    }
}

fn chr(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("char", args, 1)?;
    let code = want_int("char", args, 0)?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::str(c.to_string()))
        .ok_or_else(|| format!("char() argument {code} is not a valid code point"))
}

fn bin(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("bin", args, 1)?;
    let value = want_int("bin", args, 0)?;
    let sign = if value < 0 { "-" } else { "" };
    Ok(Value::str(format!("{sign}{:b}", value.unsigned_abs())))
}

fn oct(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("oct", args, 1)?;
    let value = want_int("oct", args, 0)?;
    let sign = if value < 0 { "-" } else { "" };
    Ok(Value::str(format!("{sign}{:o}", value.unsigned_abs())))
}

fn hex(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("hex", args, 1)?;
    let value = want_int("hex", args, 0)?;
    let sign = if value < 0 { "-" } else { "" };
    Ok(Value::str(format!("{sign}{:x}", value.unsigned_abs())))
}

fn defined_var(interpreter: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("defined_var", args, 1)?;
    let name = want_str("defined_var", args, 0)?;
    Ok(Value::bool(
        interpreter.scopes.get(interpreter.global, name).is_some(),
    ))
}

fn len(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("len", args, 1)?;
    match &args[0].kind {
        ValueKind::Str(value) => Ok(Value::int(value.chars().count() as i64)),
        ValueKind::List(items) => Ok(Value::int(items.borrow().len() as i64)),
        ValueKind::Dict(items) => Ok(Value::int(items.borrow().len() as i64)),
        _ => Err(format!(
            "object of type {} has no length",
            args[0].kind_name()
        )),
    }
}

fn range(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity_between("range", args, 1, 3)?;
    let (start, stop, step) = match args.len() {
        1 => (0, want_int("range", args, 0)?, 1),
        2 => (want_int("range", args, 0)?, want_int("range", args, 1)?, 1),
        _ => (
            want_int("range", args, 0)?,
            want_int("range", args, 1)?,
            want_int("range", args, 2)?,
        ),
    };
    if step == 0 {
        return Err("range() step must not be zero".to_string());
    }

    let mut result = vec![];
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        result.push(Value::int(i));
        i += step;
    }
    Ok(Value::list(result))
}

fn append(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("append", args, 2)?;
    let items = want_list("append", args, 0)?;
    items.borrow_mut().push(args[1].clone());
    Ok(Value::null())
}

fn extend(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("extend", args, 2)?;
    let items = want_list("extend", args, 0)?;
    let extra = want_list("extend", args, 1)?.borrow().clone();
    items.borrow_mut().extend(extra);
    Ok(Value::null())
}

fn remove(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("remove", args, 2)?;
    let items = want_list("remove", args, 0)?;
    let mut items = items.borrow_mut();
    match items.iter().position(|item| item.equals(&args[1])) {
        Some(at) => {
            items.remove(at);
            Ok(Value::null())
        }
        None => Err("value not in list".to_string()),
    }
}

fn clear(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("clear", args, 1)?;
    match &args[0].kind {
        ValueKind::List(items) => items.borrow_mut().clear(),
        ValueKind::Dict(items) => items.borrow_mut().clear(),
        _ => return Err("clear() expects a list or dict argument".to_string()),
    }
    Ok(Value::null())
}

fn reverse(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("reverse", args, 1)?;
    let items = args[0].iterable_items().map_err(|error| error.details)?;
    Ok(Value::list(items.into_iter().rev().collect()))
}

fn sort(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("sort", args, 1)?;
    let items = want_list("sort", args, 0)?;
    let mut items = items.borrow_mut();

    let mut failure = None;
    items.sort_by(|a, b| match a.compare(b) {
        Ok(ordering) => ordering,
        Err(error) => {
            failure = Some(error.details);
            Ordering::Equal
        }
    });
    match failure {
        Some(details) => Err(details),
        None => Ok(Value::null()),
    }
}

fn poplist(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity_between("poplist", args, 1, 2)?;
    let items = want_list("poplist", args, 0)?;
    let mut items = items.borrow_mut();
    let at = if args.len() == 2 {
        want_int("poplist", args, 1)?
    } else {
        -1
    };
    let resolved = if at < 0 { at + items.len() as i64 } else { at };
    if resolved < 0 || resolved >= items.len() as i64 {
        return Err("pop index out of range".to_string());
    }
    Ok(items.remove(resolved as usize))
}

fn popdict(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("popdict", args, 2)?;
    let items = want_dict("popdict", args, 0)?;
    let key = DictKey::of(&args[1]).map_err(|error| error.details)?;
    items
        .borrow_mut()
        .shift_remove(&key)
        .ok_or_else(|| format!("key {} not in dict", args[1]))
}

fn sum(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("sum", args, 1)?;
    let items = want_list("sum", args, 0)?;
    let mut total = Number::Int(0);
    for item in items.borrow().iter() {
        let ValueKind::Number(number) = &item.kind else {
            return Err(format!("cannot sum {}", item.kind_name()));
        };
        total = total.add(*number);
    }
    Ok(Value::number(total))
}

fn join(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("join", args, 2)?;
    let items = want_list("join", args, 0)?;
    let separator = want_str("join", args, 1)?;
    let mut parts = vec![];
    for item in items.borrow().iter() {
        let ValueKind::Str(part) = &item.kind else {
            return Err(format!("join() requires strings, got {}", item.kind_name()));
        };
        parts.push(part.to_string());
    }
    Ok(Value::str(parts.join(separator)))
}

fn index_of(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("index", args, 2)?;
    match &args[0].kind {
        ValueKind::List(items) => items
            .borrow()
            .iter()
            .position(|item| item.equals(&args[1]))
            .map(|at| Value::int(at as i64))
            .ok_or_else(|| "value not in list".to_string()),
        ValueKind::Str(value) => {
            let needle = want_str("index", args, 1)?;
            match value.find(needle) {
                Some(at) => Ok(Value::int(value[..at].chars().count() as i64)),
                None => Err("substring not found".to_string()),
            }
        }
        _ => Err("index() expects a list or string argument".to_string()),
    }
}

fn count(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("count", args, 2)?;
    match &args[0].kind {
        ValueKind::List(items) => Ok(Value::int(
            items
                .borrow()
                .iter()
                .filter(|item| item.equals(&args[1]))
                .count() as i64,
        )),
        ValueKind::Str(value) => {
            let needle = want_str("count", args, 1)?;
            if needle.is_empty() {
                return Ok(Value::int(value.chars().count() as i64 + 1));
            }
            Ok(Value::int(value.matches(needle).count() as i64))
        }
        _ => Err("count() expects a list or string argument".to_string()),
    }
}

fn enumerate(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity_between("enum", args, 1, 2)?;
    let start = if args.len() == 2 {
        want_int("enum", args, 1)?
    } else {
        0
    };
    let items = args[0].iterable_items().map_err(|error| error.details)?;
    Ok(Value::list(
        items
            .into_iter()
            .enumerate()
            .map(|(i, item)| Value::list(vec![Value::int(start + i as i64), item]))
            .collect(),
    ))
}

fn zip_lists(name: &str, args: &[Value]) -> Result<Vec<Vec<Value>>, String> {
    if args.is_empty() {
        return Err(format!("{name}() takes at least 1 argument"));
    }
    let mut lists = vec![];
    for at in 0..args.len() {
        lists.push(want_list(name, args, at)?.borrow().clone());
    }
    Ok(lists)
}

fn zip_short(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    let lists = zip_lists("zip_short", args)?;
    let shortest = lists.iter().map(Vec::len).min().unwrap_or(0);
    Ok(Value::list(
        (0..shortest)
            .map(|i| Value::list(lists.iter().map(|list| list[i].clone()).collect()))
            .collect(),
    ))
}

fn zip_long(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    let lists = zip_lists("zip_long", args)?;
    let longest = lists.iter().map(Vec::len).max().unwrap_or(0);
    Ok(Value::list(
        (0..longest)
            .map(|i| {
                Value::list(
                    lists
                        .iter()
                        .map(|list| list.get(i).cloned().unwrap_or_else(Value::null))
                        .collect(),
                )
            })
            .collect(),
    ))
}

/// The indices selected by a `(start, stop, step)` slice over `len` elements,
/// with negative positions counted from the end.
fn slice_indices(len: i64, args: &[Value]) -> OpResult<Vec<i64>> {
    if args.len() > 3 {
        return Err(OpError::new(
            ErrorKind::List,
            "slice takes at most 3 arguments",
        ));
    }

    let mut bounds = [None, None, None];
    for (at, arg) in args.iter().enumerate() {
        bounds[at] = match &arg.kind {
            ValueKind::Null => None,
            ValueKind::Number(Number::Int(value)) => Some(*value),
            _ => {
                return Err(OpError::new(
                    ErrorKind::List,
                    "slice indices must be integers",
                ))
            }
        };
    }
    let [start, stop, step] = bounds;

    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(OpError::new(ErrorKind::List, "slice step cannot be zero"));
    }

    let normalize = |bound: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        if step > 0 {
            bound.clamp(0, len)
        } else {
            bound.clamp(-1, len - 1)
        }
    };
    let start = start.map(&normalize).unwrap_or(if step > 0 { 0 } else { len - 1 });
    let stop = stop.map(&normalize).unwrap_or(if step > 0 { len } else { -1 });

    let mut indices = vec![];
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        indices.push(i);
        i += step;
    }
    Ok(indices)
}

/// Slice a list the way calling it does: `xs(start, stop, step)`.
pub fn slice_values(items: &[Value], args: &[Value]) -> OpResult<Vec<Value>> {
    let indices = slice_indices(items.len() as i64, args)?;
    Ok(indices
        .into_iter()
        .map(|i| items[i as usize].clone())
        .collect())
}

fn slice(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity_between("slice", args, 1, 4)?;
    match &args[0].kind {
        ValueKind::List(items) => {
            let sliced =
                slice_values(&items.borrow(), &args[1..]).map_err(|error| error.details)?;
            Ok(Value::list(sliced))
        }
        ValueKind::Str(value) => {
            let chars: Vec<char> = value.chars().collect();
            let indices =
                slice_indices(chars.len() as i64, &args[1..]).map_err(|error| error.details)?;
            Ok(Value::str(
                indices
                    .into_iter()
                    .map(|i| chars[i as usize])
                    .collect::<String>(),
            ))
        }
        _ => Err("slice() expects a list or string argument".to_string()),
    }
}

fn getitem(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("getitem", args, 2)?;
    args[0].index_by(&args[1]).map_err(|error| error.details)
}

fn setitem(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("setitem", args, 3)?;
    match &args[0].kind {
        ValueKind::List(items) => {
            let mut items = items.borrow_mut();
            let at = want_int("setitem", args, 1)?;
            let resolved = if at < 0 { at + items.len() as i64 } else { at };
            if resolved < 0 || resolved >= items.len() as i64 {
                return Err("index out of range".to_string());
            }
            items[resolved as usize] = args[2].clone();
            Ok(Value::null())
        }
        ValueKind::Dict(items) => {
            let key = DictKey::of(&args[1]).map_err(|error| error.details)?;
            items.borrow_mut().insert(key, args[2].clone());
            Ok(Value::null())
        }
        _ => Err("setitem() expects a list or dict argument".to_string()),
    }
}

fn delitem(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("delitem", args, 2)?;
    match &args[0].kind {
        ValueKind::List(items) => {
            let mut items = items.borrow_mut();
            let at = want_int("delitem", args, 1)?;
            let resolved = if at < 0 { at + items.len() as i64 } else { at };
            if resolved < 0 || resolved >= items.len() as i64 {
                return Err("index out of range".to_string());
            }
            items.remove(resolved as usize);
            Ok(Value::null())
        }
        ValueKind::Dict(items) => {
            let key = DictKey::of(&args[1]).map_err(|error| error.details)?;
            items
                .borrow_mut()
                .shift_remove(&key)
                .map(|_| Value::null())
                .ok_or_else(|| format!("key {} not in dict", args[1]))
        }
        _ => Err("delitem() expects a list or dict argument".to_string()),
    }
}

fn shallow_copy(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("copy", args, 1)?;
    Ok(match &args[0].kind {
        ValueKind::List(items) => Value::list(items.borrow().clone()),
        ValueKind::Dict(items) => Value::dict(items.borrow().clone()),
        _ => args[0].clone(),
    })
}

fn deep(value: &Value) -> Value {
    match &value.kind {
        ValueKind::List(items) => Value::list(items.borrow().iter().map(deep).collect()),
        ValueKind::Dict(items) => Value::dict(
            items
                .borrow()
                .iter()
                .map(|(key, value)| (key.clone(), deep(value)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

fn deep_copy(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("deepcopy", args, 1)?;
    Ok(deep(&args[0]))
}

fn replace(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity_between("replace", args, 2, 3)?;
    let value = want_str("replace", args, 0)?;
    let from = want_str("replace", args, 1)?;
    let to = if args.len() == 3 {
        want_str("replace", args, 2)?
    } else {
        ""
    };
    Ok(Value::str(value.replace(from, to)))
}

fn strip_set(name: &str, args: &[Value]) -> Result<(String, Vec<char>), String> {
    arity_between(name, args, 1, 2)?;
    let value = want_str(name, args, 0)?.to_string();
    let set = if args.len() == 2 {
        want_str(name, args, 1)?.chars().collect()
    } else {
        vec![' ']
    };
    Ok((value, set))
}

fn strip(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    let (value, set) = strip_set("strip", args)?;
    Ok(Value::str(value.trim_matches(|c| set.contains(&c))))
}

fn lstrip(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    let (value, set) = strip_set("lstrip", args)?;
    Ok(Value::str(value.trim_start_matches(|c| set.contains(&c))))
}

fn rstrip(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    let (value, set) = strip_set("rstrip", args)?;
    Ok(Value::str(value.trim_end_matches(|c| set.contains(&c))))
}

fn split(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity_between("split", args, 1, 2)?;
    let value = want_str("split", args, 0)?;
    let separator = if args.len() == 2 {
        want_str("split", args, 1)?
    } else {
        " "
    };
    if separator.is_empty() {
        return Err("empty separator".to_string());
    }
    Ok(Value::list(value.split(separator).map(Value::str).collect()))
}

fn find(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("find", args, 2)?;
    let value = want_str("find", args, 0)?;
    let needle = want_str("find", args, 1)?;
    Ok(match value.find(needle) {
        Some(at) => Value::int(value[..at].chars().count() as i64),
        None => Value::int(-1),
    })
}

fn startswith(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("startswith", args, 2)?;
    let value = want_str("startswith", args, 0)?;
    let prefix = want_str("startswith", args, 1)?;
    Ok(Value::bool(value.starts_with(prefix)))
}

fn endswith(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("endswith", args, 2)?;
    let value = want_str("endswith", args, 0)?;
    let suffix = want_str("endswith", args, 1)?;
    Ok(Value::bool(value.ends_with(suffix)))
}

fn keys(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("keys", args, 1)?;
    let items = want_dict("keys", args, 0)?;
    Ok(Value::list(
        items.borrow().keys().map(DictKey::to_value).collect(),
    ))
}

fn values(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("values", args, 1)?;
    let items = want_dict("values", args, 0)?;
    Ok(Value::list(items.borrow().values().cloned().collect()))
}

fn items(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("items", args, 1)?;
    let items = want_dict("items", args, 0)?;
    Ok(Value::list(
        items
            .borrow()
            .iter()
            .map(|(key, value)| Value::list(vec![key.to_value(), value.clone()]))
            .collect(),
    ))
}

fn getdefault(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity_between("getdefault", args, 2, 3)?;
    let items = want_dict("getdefault", args, 0)?;
    let key = DictKey::of(&args[1]).map_err(|error| error.details)?;
    let fallback = args.get(2).cloned().unwrap_or_else(Value::null);
    Ok(items.borrow().get(&key).cloned().unwrap_or(fallback))
}

fn setdefault(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity_between("setdefault", args, 2, 3)?;
    let items = want_dict("setdefault", args, 0)?;
    let key = DictKey::of(&args[1]).map_err(|error| error.details)?;
    let fallback = args.get(2).cloned().unwrap_or_else(Value::null);
    let mut items = items.borrow_mut();
    Ok(items.entry(key).or_insert(fallback).clone())
}

fn ternary(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("ternary", args, 3)?;
    Ok(if args[0].is_true() {
        args[1].clone()
    } else {
        args[2].clone()
    })
}

fn globals(interpreter: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("globals", args, 0)?;
    let mut map = IndexMap::new();
    for (name, value) in interpreter.scopes.snapshot(interpreter.global) {
        map.insert(DictKey::Str(name), value);
    }
    Ok(Value::dict(map))
}

fn read_file(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("read", args, 1)?;
    let path = want_str("read", args, 0)?;
    std::fs::read_to_string(path)
        .map(Value::str)
        .map_err(|err| format!("cannot read {path}: {err}"))
}

fn write_file(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("write", args, 2)?;
    let path = want_str("write", args, 0)?;
    let content = want_str("write", args, 1)?;
    std::fs::write(path, content).map_err(|err| format!("cannot write {path}: {err}"))?;
    Ok(Value::null())
}

fn system(_: &mut Interpreter, args: &[Value]) -> NativeResult {
    arity("system", args, 1)?;
    let command = want_str("system", args, 0)?;
    let status = std::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .status()
        .map_err(|err| err.to_string())?;
    Ok(Value::int(status.code().unwrap_or(-1) as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> Interpreter {
        let mut interpreter = Interpreter::new();
        install(&mut interpreter);
        interpreter
    }

    #[test]
    fn test_install_exposes_builtins() {
        let interpreter = machine();
        assert!(interpreter.scopes.get(interpreter.global, "print").is_some());
        assert!(interpreter
            .scopes
            .get(interpreter.global, "__System_maxrecursion")
            .is_some());
    }

    #[test]
    fn test_range_forms() {
        let mut interpreter = machine();
        let result = range(&mut interpreter, &[Value::int(5)]).unwrap();
        assert!(result.equals(&Value::list(
            (0..5).map(Value::int).collect()
        )));

        let result = range(
            &mut interpreter,
            &[Value::int(5), Value::int(1), Value::int(-2)],
        )
        .unwrap();
        assert!(result.equals(&Value::list(vec![Value::int(5), Value::int(3)])));
    }

    #[test]
    fn test_append_mutates_through_aliases() {
        let mut interpreter = machine();
        let list = Value::list(vec![Value::int(1)]);
        let alias = list.clone();
        append(&mut interpreter, &[list, Value::int(2)]).unwrap();
        assert!(alias.equals(&Value::list(vec![Value::int(1), Value::int(2)])));
    }

    #[test]
    fn test_slice_indices_python_shapes() {
        let items: Vec<Value> = (0..5).map(Value::int).collect();

        let sliced = slice_values(&items, &[Value::int(1), Value::int(4)]).unwrap();
        assert_eq!(3, sliced.len());

        let sliced = slice_values(&items, &[Value::null(), Value::null(), Value::int(-1)]).unwrap();
        assert!(sliced[0].equals(&Value::int(4)));

        let error = slice_values(&items, &[Value::float(1.5)]).unwrap_err();
        assert_eq!(ErrorKind::List, error.kind);
    }

    #[test]
    fn test_sum_and_sort() {
        let mut interpreter = machine();
        let list = Value::list(vec![Value::int(3), Value::int(1), Value::int(2)]);
        assert!(sum(&mut interpreter, &[list.clone()])
            .unwrap()
            .equals(&Value::int(6)));

        sort(&mut interpreter, &[list.clone()]).unwrap();
        assert!(list.equals(&Value::list(vec![
            Value::int(1),
            Value::int(2),
            Value::int(3)
        ])));
    }

    #[test]
    fn test_arity_errors_are_reported() {
        let mut interpreter = machine();
        let error = len(&mut interpreter, &[]).unwrap_err();
        assert!(error.contains("len()"));
    }

    #[test]
    fn test_string_helpers() {
        let mut interpreter = machine();
        assert!(split(&mut interpreter, &[Value::str("a b c")])
            .unwrap()
            .equals(&Value::list(vec![
                Value::str("a"),
                Value::str("b"),
                Value::str("c")
            ])));
        assert!(strip(&mut interpreter, &[Value::str("  pad  ")])
            .unwrap()
            .equals(&Value::str("pad")));
        assert!(find(&mut interpreter, &[Value::str("hello"), Value::str("lo")])
            .unwrap()
            .equals(&Value::int(3)));
    }
}
