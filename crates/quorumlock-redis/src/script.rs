// Server-side scripts for the compare-and-act primitives
// Each runs atomically on the Redis server.

use std::sync::LazyLock;

use redis::Script;

/// Delete KEYS[1] only if it holds ARGV[1]. Returns 1 if deleted.
const DELETE_IF_EQUALS: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Write ARGV[1] with a PX of ARGV[2] if KEYS[1] is absent, or refresh the
/// expiry if it already holds ARGV[1]. Returns 1 on success.
const SET_IF_ABSENT_OR_EQUAL: &str = r#"
local current = redis.call("GET", KEYS[1])
if current == false then
    redis.call("SET", KEYS[1], ARGV[1], "PX", ARGV[2])
    return 1
elseif current == ARGV[1] then
    redis.call("PEXPIRE", KEYS[1], ARGV[2])
    return 1
else
    return 0
end
"#;

pub(crate) static DELETE_IF_EQUALS_SCRIPT: LazyLock<Script> =
    LazyLock::new(|| Script::new(DELETE_IF_EQUALS));

pub(crate) static SET_IF_ABSENT_OR_EQUAL_SCRIPT: LazyLock<Script> =
    LazyLock::new(|| Script::new(SET_IF_ABSENT_OR_EQUAL));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_compare_before_acting() {
        let del = DELETE_IF_EQUALS.find("GET").unwrap();
        assert!(del < DELETE_IF_EQUALS.find("DEL").unwrap());

        let get = SET_IF_ABSENT_OR_EQUAL.find("GET").unwrap();
        assert!(get < SET_IF_ABSENT_OR_EQUAL.find("PEXPIRE").unwrap());
        assert_ne!(
            DELETE_IF_EQUALS_SCRIPT.get_hash(),
            SET_IF_ABSENT_OR_EQUAL_SCRIPT.get_hash()
        );
    }
}
