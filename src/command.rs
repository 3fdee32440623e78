//! Command dispatch: decoded request arguments in, one framed response out.
//!
//! Every handler takes the whole keyspace rather than reaching for global
//! state, so a connection's command loop (and every test here) can drive it
//! directly without a socket in the loop.

use crate::config::Configuration;
use crate::entry::{key_eq, keyspace_hash, Entry, Keyspace, Payload};
use crate::protocol::{ErrorCode, ResponseWriter};
use crate::sorted_set::SortedSet;

fn parse_f64(bytes: &[u8]) -> Option<f64> {
    std::str::from_utf8(bytes).ok()?.trim().parse().ok()
}

fn parse_i64(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.trim().parse().ok()
}

/// Executes one already-parsed command, returning a complete, length-
/// prefixed response frame ready to queue on the connection's outgoing
/// buffer. Dispatch is keyed on name and arity together, so a recognized
/// name called with the wrong number of arguments falls through to the
/// same `Unknown` error as an unrecognized name. Command names are matched
/// case-sensitively, as the original does.
///
/// The response body is bounded by `config.max_message_bytes`; an oversized
/// body is discarded in favor of a `TooBig` error reply.
pub fn execute(keyspace: &mut Keyspace, args: &[Vec<u8>], config: &Configuration) -> Vec<u8> {
    let mut out = ResponseWriter::new();
    let name = args.first().map(|a| a.as_slice());

    match (name, args.len()) {
        (Some(b"get"), 2) => do_get(keyspace, args, &mut out),
        (Some(b"set"), 3) => do_set(keyspace, args, &mut out),
        (Some(b"del"), 2) => do_del(keyspace, args, &mut out),
        (Some(b"keys"), 1) => do_keys(keyspace, args, &mut out),
        (Some(b"sadd"), 4) => do_sadd(keyspace, args, &mut out, config),
        (Some(b"srem"), 3) => do_srem(keyspace, args, &mut out),
        (Some(b"sscore"), 3) => do_sscore(keyspace, args, &mut out),
        (Some(b"squery"), 6) => do_squery(keyspace, args, &mut out),
        _ => out.write_err(ErrorCode::Unknown, "unknown command."),
    }
    out.into_frame_checked(config.max_message_bytes)
}

fn do_get(keyspace: &mut Keyspace, args: &[Vec<u8>], out: &mut ResponseWriter) {
    let key = &args[1];
    match keyspace.lookup(keyspace_hash(key), key_eq(key)) {
        Some(entry) => match &entry.payload {
            Payload::Str(v) => out.write_str(v),
            Payload::SortedSet(_) => out.write_err(ErrorCode::BadTyp, "not a string value"),
        },
        None => out.write_nil(),
    }
}

fn do_set(keyspace: &mut Keyspace, args: &[Vec<u8>], out: &mut ResponseWriter) {
    let key = &args[1];
    let hash = keyspace_hash(key);
    if let Some(entry) = keyspace.lookup_mut(hash, key_eq(key)) {
        return match &mut entry.payload {
            Payload::Str(v) => {
                *v = args[2].clone();
                out.write_nil();
            }
            Payload::SortedSet(_) => out.write_err(ErrorCode::BadTyp, "a non-string value exists"),
        };
    }
    keyspace.insert(hash, Entry::new_str(key.clone(), args[2].clone()));
    out.write_nil();
}

fn do_del(keyspace: &mut Keyspace, args: &[Vec<u8>], out: &mut ResponseWriter) {
    let key = &args[1];
    let removed = keyspace.delete(keyspace_hash(key), key_eq(key)).is_some();
    out.write_int(removed as i64);
}

fn do_keys(keyspace: &mut Keyspace, _args: &[Vec<u8>], out: &mut ResponseWriter) {
    out.begin_arr();
    keyspace.for_each(|entry| out.write_str(&entry.key));
    out.end_arr();
}

fn do_sadd(keyspace: &mut Keyspace, args: &[Vec<u8>], out: &mut ResponseWriter, config: &Configuration) {
    let key = &args[1];
    let score = match parse_f64(&args[2]) {
        Some(s) if !s.is_nan() => s,
        _ => return out.write_err(ErrorCode::BadArg, "expect float"),
    };
    let member = &args[3];

    let hash = keyspace_hash(key);
    if let Some(entry) = keyspace.lookup_mut(hash, key_eq(key)) {
        return match &mut entry.payload {
            Payload::SortedSet(set) => out.write_int(set.add(member, score) as i64),
            Payload::Str(_) => out.write_err(ErrorCode::BadTyp, "expect sset"),
        };
    }

    let mut set = SortedSet::with_config(config.rehash_batch_size, config.rehash_load_factor);
    set.add(member, score);
    keyspace.insert(hash, Entry { key: key.clone(), payload: Payload::SortedSet(set) });
    out.write_int(1);
}

fn do_srem(keyspace: &mut Keyspace, args: &[Vec<u8>], out: &mut ResponseWriter) {
    let key = &args[1];
    let member = &args[2];
    match keyspace.lookup_mut(keyspace_hash(key), key_eq(key)) {
        Some(entry) => match &mut entry.payload {
            Payload::SortedSet(set) => out.write_int(set.remove(member) as i64),
            Payload::Str(_) => out.write_err(ErrorCode::BadTyp, "expect sset"),
        },
        None => out.write_int(0),
    }
}

fn do_sscore(keyspace: &mut Keyspace, args: &[Vec<u8>], out: &mut ResponseWriter) {
    let key = &args[1];
    let member = &args[2];
    match keyspace.lookup_mut(keyspace_hash(key), key_eq(key)) {
        Some(entry) => match &mut entry.payload {
            Payload::SortedSet(set) => match set.score(member) {
                Some(score) => out.write_dbl(score),
                None => out.write_nil(),
            },
            Payload::Str(_) => out.write_err(ErrorCode::BadTyp, "expect sset"),
        },
        None => out.write_nil(),
    }
}

/// `squery <key> <score> <member> <offset> <limit>`: starting from the
/// smallest member `>= (score, member)`, skips `offset` members and returns
/// up to `limit` tagged items — `limit` bounds the flat `(name, score, name,
/// score, ...)` array length, so it allows at most `limit / 2` pairs.
fn do_squery(keyspace: &mut Keyspace, args: &[Vec<u8>], out: &mut ResponseWriter) {
    let key = &args[1];
    let score = match parse_f64(&args[2]) {
        Some(s) => s,
        None => return out.write_err(ErrorCode::BadArg, "expect fp number"),
    };
    let anchor = &args[3];
    let offset = match parse_i64(&args[4]) {
        Some(v) => v,
        None => return out.write_err(ErrorCode::BadArg, "expect int"),
    };
    let limit = match parse_i64(&args[5]) {
        Some(v) => v,
        None => return out.write_err(ErrorCode::BadArg, "expect int"),
    };

    match keyspace.lookup(keyspace_hash(key), key_eq(key)) {
        Some(entry) => match &entry.payload {
            Payload::SortedSet(set) => {
                out.begin_arr();
                for (name, member_score) in set.query(score, anchor, offset, limit) {
                    out.write_str(&name);
                    out.write_dbl(member_score);
                }
                out.end_arr();
            }
            Payload::Str(_) => out.write_err(ErrorCode::BadTyp, "expect sset"),
        },
        None => {
            out.begin_arr();
            out.end_arr();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Factory;
    use crate::protocol::{try_parse_frame, Value};

    fn run(keyspace: &mut Keyspace, args: &[&[u8]]) -> Value {
        let args: Vec<Vec<u8>> = args.iter().map(|a| a.to_vec()).collect();
        let frame = execute(keyspace, &args, &Configuration::default());
        let (_, payload) = try_parse_frame(&frame, 1 << 20).unwrap().unwrap();
        decode_only(payload)
    }

    fn decode_only(payload: &[u8]) -> Value {
        crate::protocol::decode_value(payload).unwrap().0
    }

    #[test]
    fn set_then_get_roundtrips_a_string() {
        let mut ks = Keyspace::new();
        assert_eq!(run(&mut ks, &[b"set", b"name", b"ivy"]), Value::Nil);
        assert_eq!(run(&mut ks, &[b"get", b"name"]), Value::Str(b"ivy".to_vec()));
    }

    #[test]
    fn get_of_missing_key_is_nil() {
        let mut ks = Keyspace::new();
        assert_eq!(run(&mut ks, &[b"get", b"missing"]), Value::Nil);
    }

    #[test]
    fn del_reports_whether_a_key_existed() {
        let mut ks = Keyspace::new();
        run(&mut ks, &[b"set", b"k", b"v"]);
        assert_eq!(run(&mut ks, &[b"del", b"k"]), Value::Int(1));
        assert_eq!(run(&mut ks, &[b"del", b"k"]), Value::Int(0));
    }

    #[test]
    fn unknown_command_yields_unknown_error() {
        let mut ks = Keyspace::new();
        assert_eq!(run(&mut ks, &[b"frobnicate"]), Value::Err(ErrorCode::Unknown as i32, "unknown command.".into()));
    }

    #[test]
    fn sadd_on_string_key_is_a_type_error() {
        let mut ks = Keyspace::new();
        run(&mut ks, &[b"set", b"k", b"v"]);
        assert_eq!(
            run(&mut ks, &[b"sadd", b"k", b"1", b"m"]),
            Value::Err(ErrorCode::BadTyp as i32, "expect sset".into())
        );
    }

    #[test]
    fn sadd_sscore_srem_round_trip() {
        let mut ks = Keyspace::new();
        assert_eq!(run(&mut ks, &[b"sadd", b"board", b"10", b"alice"]), Value::Int(1));
        assert_eq!(run(&mut ks, &[b"sadd", b"board", b"20", b"alice"]), Value::Int(0));
        assert_eq!(run(&mut ks, &[b"sscore", b"board", b"alice"]), Value::Dbl(20.0));
        assert_eq!(run(&mut ks, &[b"srem", b"board", b"alice"]), Value::Int(1));
        assert_eq!(run(&mut ks, &[b"sscore", b"board", b"alice"]), Value::Nil);
    }

    #[test]
    fn squery_on_missing_key_is_an_empty_array() {
        let mut ks = Keyspace::new();
        assert_eq!(run(&mut ks, &[b"squery", b"board", b"0", b"", b"0", b"100"]), Value::Arr(vec![]));
    }

    #[test]
    fn squery_returns_name_score_pairs_in_order() {
        let mut ks = Keyspace::new();
        run(&mut ks, &[b"sadd", b"board", b"10", b"alice"]);
        run(&mut ks, &[b"sadd", b"board", b"5", b"bob"]);
        run(&mut ks, &[b"sadd", b"board", b"15", b"carol"]);

        let got = run(&mut ks, &[b"squery", b"board", b"0", b"", b"0", b"100"]);
        assert_eq!(
            got,
            Value::Arr(vec![
                Value::Str(b"bob".to_vec()),
                Value::Dbl(5.0),
                Value::Str(b"alice".to_vec()),
                Value::Dbl(10.0),
                Value::Str(b"carol".to_vec()),
                Value::Dbl(15.0),
            ])
        );
    }

    #[test]
    fn squery_limit_bounds_tagged_items_not_pairs() {
        let mut ks = Keyspace::new();
        for i in 0..5 {
            run(&mut ks, &[b"sadd", b"board", format!("{i}").as_bytes(), format!("m{i}").as_bytes()]);
        }
        // limit=3 lets the loop through once (0 < 3) but not twice (2 < 3
        // then 4 !< 3), so exactly one pair comes back.
        let got = run(&mut ks, &[b"squery", b"board", b"0", b"", b"0", b"3"]);
        assert_eq!(got, Value::Arr(vec![Value::Str(b"m0".to_vec()), Value::Dbl(0.0)]));
    }

    #[test]
    fn wrong_arity_is_an_unknown_command_error() {
        let mut ks = Keyspace::new();
        assert_eq!(
            run(&mut ks, &[b"get"]),
            Value::Err(ErrorCode::Unknown as i32, "unknown command.".into())
        );
    }

    #[test]
    fn non_numeric_score_is_a_bad_arg_error() {
        let mut ks = Keyspace::new();
        assert_eq!(
            run(&mut ks, &[b"sadd", b"board", b"not-a-number", b"alice"]),
            Value::Err(ErrorCode::BadArg as i32, "expect float".into())
        );
    }

    #[test]
    fn keys_lists_every_key_regardless_of_type() {
        let mut ks = Keyspace::new();
        run(&mut ks, &[b"set", b"a", b"1"]);
        run(&mut ks, &[b"sadd", b"b", b"1", b"m"]);
        let got = run(&mut ks, &[b"keys"]);
        match got {
            Value::Arr(items) => {
                let mut names: Vec<Vec<u8>> = items
                    .into_iter()
                    .map(|v| match v {
                        Value::Str(s) => s,
                        other => panic!("expected Str, got {other:?}"),
                    })
                    .collect();
                names.sort();
                assert_eq!(names, vec![b"a".to_vec(), b"b".to_vec()]);
            }
            other => panic!("expected Arr, got {other:?}"),
        }
    }

    #[test]
    fn command_names_are_case_sensitive() {
        let mut ks = Keyspace::new();
        run(&mut ks, &[b"set", b"k", b"v"]);
        assert_eq!(
            run(&mut ks, &[b"GET", b"k"]),
            Value::Err(ErrorCode::Unknown as i32, "unknown command.".into())
        );
        assert_eq!(run(&mut ks, &[b"get", b"k"]), Value::Str(b"v".to_vec()));
    }

    #[test]
    fn oversized_response_is_truncated_to_too_big_error() {
        let mut ks = Keyspace::new();
        run(&mut ks, &[b"set", b"k", &vec![b'x'; 100]]);
        let args: Vec<Vec<u8>> = [b"get".as_slice(), b"k".as_slice()].iter().map(|a| a.to_vec()).collect();
        let frame = execute(&mut ks, &args, &Factory::new().max_message_bytes(10).build());
        let (_, payload) = try_parse_frame(&frame, 1 << 20).unwrap().unwrap();
        let value = decode_only(payload);
        assert_eq!(value, Value::Err(ErrorCode::TooBig as i32, "response is too big.".into()));
    }
}
