//! Script opcodes for Bitcoin SV consensus execution.
//!
//! Constants grouped by category, matching the post-Genesis opcode set
//! (e.g. OP_CAT and OP_MUL re-enabled).

// Pushdata and Constants
/// Pushes empty array (0/false) onto the stack.
pub const OP_0: u8 = 0;
/// Alias of OP_0.
pub const OP_FALSE: u8 = 0;
/// Offset for direct pushes of 1-75 bytes.
pub const OP_PUSH: u8 = 0;

/// Next byte is push length (up to 255 bytes).
pub const OP_PUSHDATA1: u8 = 76;
/// Next two bytes are push length (up to 65535 bytes).
pub const OP_PUSHDATA2: u8 = 77;
/// Next four bytes are push length (up to 4GB).
pub const OP_PUSHDATA4: u8 = 78;

/// Pushes -1 onto the stack.
pub const OP_1NEGATE: u8 = 79;

/// Pushes 1 (true) onto the stack.
pub const OP_1: u8 = 81;
/// Alias of OP_1.
pub const OP_TRUE: u8 = 81;
/// Pushes 2 onto the stack.
pub const OP_2: u8 = 82;
/// Pushes 3 onto the stack.
pub const OP_3: u8 = 83;
/// Pushes 4 onto the stack.
pub const OP_4: u8 = 84;
/// Pushes 5 onto the stack.
pub const OP_5: u8 = 85;
/// Pushes 6 onto the stack.
pub const OP_6: u8 = 86;
/// Pushes 7 onto the stack.
pub const OP_7: u8 = 87;
/// Pushes 8 onto the stack.
pub const OP_8: u8 = 88;
/// Pushes 9 onto the stack.
pub const OP_9: u8 = 89;
/// Pushes 10 onto the stack.
pub const OP_10: u8 = 90;
/// Pushes 11 onto the stack.
pub const OP_11: u8 = 91;
/// Pushes 12 onto the stack.
pub const OP_12: u8 = 92;
/// Pushes 13 onto the stack.
pub const OP_13: u8 = 93;
/// Pushes 14 onto the stack.
pub const OP_14: u8 = 94;
/// Pushes 15 onto the stack.
pub const OP_15: u8 = 95;
/// Pushes 16 onto the stack.
pub const OP_16: u8 = 96;

// Flow Control
/// Does nothing.
pub const OP_NOP: u8 = 97;
/// If top of stack is true, executes the block (pops bool).
pub const OP_IF: u8 = 99;
/// If top of stack is false, executes the block (pops bool).
pub const OP_NOTIF: u8 = 100;
/// Inverts the preceding IF/NOTIF branch.
pub const OP_ELSE: u8 = 103;
/// Ends an IF/ELSE block.
pub const OP_ENDIF: u8 = 104;
/// Fails if top of stack is false (pops bool).
pub const OP_VERIFY: u8 = 105;
/// Ends execution (invalid pre-Genesis).
pub const OP_RETURN: u8 = 106;

// Stack Operations
/// Moves the top item to the alt stack.
pub const OP_TOALTSTACK: u8 = 107;
/// Moves the top alt stack item to the main stack.
pub const OP_FROMALTSTACK: u8 = 108;
/// Drops top two items.
pub const OP_2DROP: u8 = 109;
/// Duplicates top two items.
pub const OP_2DUP: u8 = 110;
/// Duplicates top three items.
pub const OP_3DUP: u8 = 111;
/// Copies the third and fourth items to the top.
pub const OP_2OVER: u8 = 112;
/// Moves the fifth and sixth items to the top.
pub const OP_2ROT: u8 = 113;
/// Swaps the top two pairs.
pub const OP_2SWAP: u8 = 114;
/// Duplicates the top item if it is non-zero.
pub const OP_IFDUP: u8 = 115;
/// Pushes the stack depth.
pub const OP_DEPTH: u8 = 116;
/// Drops the top item.
pub const OP_DROP: u8 = 117;
/// Duplicates the top item.
pub const OP_DUP: u8 = 118;
/// Removes the second-from-top item.
pub const OP_NIP: u8 = 119;
/// Copies the second-from-top item to the top.
pub const OP_OVER: u8 = 120;
/// Copies the nth item to the top.
pub const OP_PICK: u8 = 121;
/// Moves the nth item to the top.
pub const OP_ROLL: u8 = 122;
/// Rotates the top three items left.
pub const OP_ROT: u8 = 123;
/// Swaps the top two items.
pub const OP_SWAP: u8 = 124;
/// Copies the top item below the second-from-top.
pub const OP_TUCK: u8 = 125;

// Splice
/// Concatenates the top two items.
pub const OP_CAT: u8 = 126;
/// Splits the second-from-top item at the top index.
pub const OP_SPLIT: u8 = 127;
/// Converts a number to a binary blob of given length.
pub const OP_NUM2BIN: u8 = 128;
/// Converts a binary blob to a minimally-encoded number.
pub const OP_BIN2NUM: u8 = 129;
/// Pushes the length of the top item without popping it.
pub const OP_SIZE: u8 = 130;

// Bitwise Logic
/// Inverts all bits of the top item.
pub const OP_INVERT: u8 = 131;
/// Bitwise AND of the top two items.
pub const OP_AND: u8 = 132;
/// Bitwise OR of the top two items.
pub const OP_OR: u8 = 133;
/// Bitwise XOR of the top two items.
pub const OP_XOR: u8 = 134;
/// Byte equality of the top two items.
pub const OP_EQUAL: u8 = 135;
/// OP_EQUAL then OP_VERIFY.
pub const OP_EQUALVERIFY: u8 = 136;

// Arithmetic
/// Adds 1 to the top number.
pub const OP_1ADD: u8 = 139;
/// Subtracts 1 from the top number.
pub const OP_1SUB: u8 = 140;
/// Negates the top number.
pub const OP_NEGATE: u8 = 143;
/// Absolute value of the top number.
pub const OP_ABS: u8 = 144;
/// Logical NOT of the top number.
pub const OP_NOT: u8 = 145;
/// 1 if the top number is non-zero, else 0.
pub const OP_0NOTEQUAL: u8 = 146;
/// Adds the top two numbers.
pub const OP_ADD: u8 = 147;
/// Subtracts the top number from the second.
pub const OP_SUB: u8 = 148;
/// Multiplies the top two numbers.
pub const OP_MUL: u8 = 149;
/// Divides the second number by the top.
pub const OP_DIV: u8 = 150;
/// Remainder of the second number divided by the top.
pub const OP_MOD: u8 = 151;
/// Left shifts the second item by the top number of bits.
pub const OP_LSHIFT: u8 = 152;
/// Right shifts the second item by the top number of bits.
pub const OP_RSHIFT: u8 = 153;
/// Boolean AND of two numbers.
pub const OP_BOOLAND: u8 = 154;
/// Boolean OR of two numbers.
pub const OP_BOOLOR: u8 = 155;
/// Numeric equality.
pub const OP_NUMEQUAL: u8 = 156;
/// OP_NUMEQUAL then OP_VERIFY.
pub const OP_NUMEQUALVERIFY: u8 = 157;
/// Numeric inequality.
pub const OP_NUMNOTEQUAL: u8 = 158;
/// a < b for numbers.
pub const OP_LESSTHAN: u8 = 159;
/// a > b for numbers.
pub const OP_GREATERTHAN: u8 = 160;
/// a <= b for numbers.
pub const OP_LESSTHANOREQUAL: u8 = 161;
/// a >= b for numbers.
pub const OP_GREATERTHANOREQUAL: u8 = 162;
/// Minimum of two numbers.
pub const OP_MIN: u8 = 163;
/// Maximum of two numbers.
pub const OP_MAX: u8 = 164;
/// min <= x < max for numbers.
pub const OP_WITHIN: u8 = 165;

// Cryptography
/// RIPEMD160 of the top item.
pub const OP_RIPEMD160: u8 = 166;
/// SHA1 of the top item.
pub const OP_SHA1: u8 = 167;
/// SHA256 of the top item.
pub const OP_SHA256: u8 = 168;
/// RIPEMD160(SHA256(top)).
pub const OP_HASH160: u8 = 169;
/// SHA256(SHA256(top)).
pub const OP_HASH256: u8 = 170;
/// Signature matching starts from here.
pub const OP_CODESEPARATOR: u8 = 171;
/// Verifies a signature for a pubkey against the transaction.
pub const OP_CHECKSIG: u8 = 172;
/// OP_CHECKSIG then OP_VERIFY.
pub const OP_CHECKSIGVERIFY: u8 = 173;
/// m-of-n multisig check.
pub const OP_CHECKMULTISIG: u8 = 174;
/// OP_CHECKMULTISIG then OP_VERIFY.
pub const OP_CHECKMULTISIGVERIFY: u8 = 175;

// Locktime (pre-Genesis only; NOPs afterwards)
/// Fails if the required locktime exceeds the transaction's (BIP-65).
pub const OP_CHECKLOCKTIMEVERIFY: u8 = 177;
/// Fails if the required sequence exceeds the input's (BIP-112).
pub const OP_CHECKSEQUENCEVERIFY: u8 = 178;

// Reserved (invalid when executed)
pub(crate) const OP_RESERVED: u8 = 80;
pub(crate) const OP_VER: u8 = 98;
pub(crate) const OP_VERIF: u8 = 101;
pub(crate) const OP_VERNOTIF: u8 = 102;
pub(crate) const OP_RESERVED1: u8 = 137;
pub(crate) const OP_RESERVED2: u8 = 138;

// Disabled on every rule set
pub(crate) const OP_2MUL: u8 = 141;
pub(crate) const OP_2DIV: u8 = 142;

// NOPs (ignored)
pub(crate) const OP_NOP1: u8 = 176;
pub(crate) const OP_NOP4: u8 = 179;
pub(crate) const OP_NOP5: u8 = 180;
pub(crate) const OP_NOP6: u8 = 181;
pub(crate) const OP_NOP7: u8 = 182;
pub(crate) const OP_NOP8: u8 = 183;
pub(crate) const OP_NOP9: u8 = 184;
pub(crate) const OP_NOP10: u8 = 185;

/// Opcodes >= this are invalid.
pub(crate) const OP_INVALID_ABOVE: u8 = 186;

/// Returns the display name of an opcode, or None for push lengths and
/// undefined values.
#[must_use]
pub fn name(op: u8) -> Option<&'static str> {
    let s = match op {
        OP_0 => "OP_0",
        OP_PUSHDATA1 => "OP_PUSHDATA1",
        OP_PUSHDATA2 => "OP_PUSHDATA2",
        OP_PUSHDATA4 => "OP_PUSHDATA4",
        OP_1NEGATE => "OP_1NEGATE",
        OP_RESERVED => "OP_RESERVED",
        OP_1 => "OP_1",
        OP_2 => "OP_2",
        OP_3 => "OP_3",
        OP_4 => "OP_4",
        OP_5 => "OP_5",
        OP_6 => "OP_6",
        OP_7 => "OP_7",
        OP_8 => "OP_8",
        OP_9 => "OP_9",
        OP_10 => "OP_10",
        OP_11 => "OP_11",
        OP_12 => "OP_12",
        OP_13 => "OP_13",
        OP_14 => "OP_14",
        OP_15 => "OP_15",
        OP_16 => "OP_16",
        OP_NOP => "OP_NOP",
        OP_VER => "OP_VER",
        OP_IF => "OP_IF",
        OP_NOTIF => "OP_NOTIF",
        OP_VERIF => "OP_VERIF",
        OP_VERNOTIF => "OP_VERNOTIF",
        OP_ELSE => "OP_ELSE",
        OP_ENDIF => "OP_ENDIF",
        OP_VERIFY => "OP_VERIFY",
        OP_RETURN => "OP_RETURN",
        OP_TOALTSTACK => "OP_TOALTSTACK",
        OP_FROMALTSTACK => "OP_FROMALTSTACK",
        OP_2DROP => "OP_2DROP",
        OP_2DUP => "OP_2DUP",
        OP_3DUP => "OP_3DUP",
        OP_2OVER => "OP_2OVER",
        OP_2ROT => "OP_2ROT",
        OP_2SWAP => "OP_2SWAP",
        OP_IFDUP => "OP_IFDUP",
        OP_DEPTH => "OP_DEPTH",
        OP_DROP => "OP_DROP",
        OP_DUP => "OP_DUP",
        OP_NIP => "OP_NIP",
        OP_OVER => "OP_OVER",
        OP_PICK => "OP_PICK",
        OP_ROLL => "OP_ROLL",
        OP_ROT => "OP_ROT",
        OP_SWAP => "OP_SWAP",
        OP_TUCK => "OP_TUCK",
        OP_CAT => "OP_CAT",
        OP_SPLIT => "OP_SPLIT",
        OP_NUM2BIN => "OP_NUM2BIN",
        OP_BIN2NUM => "OP_BIN2NUM",
        OP_SIZE => "OP_SIZE",
        OP_INVERT => "OP_INVERT",
        OP_AND => "OP_AND",
        OP_OR => "OP_OR",
        OP_XOR => "OP_XOR",
        OP_EQUAL => "OP_EQUAL",
        OP_EQUALVERIFY => "OP_EQUALVERIFY",
        OP_RESERVED1 => "OP_RESERVED1",
        OP_RESERVED2 => "OP_RESERVED2",
        OP_1ADD => "OP_1ADD",
        OP_1SUB => "OP_1SUB",
        OP_2MUL => "OP_2MUL",
        OP_2DIV => "OP_2DIV",
        OP_NEGATE => "OP_NEGATE",
        OP_ABS => "OP_ABS",
        OP_NOT => "OP_NOT",
        OP_0NOTEQUAL => "OP_0NOTEQUAL",
        OP_ADD => "OP_ADD",
        OP_SUB => "OP_SUB",
        OP_MUL => "OP_MUL",
        OP_DIV => "OP_DIV",
        OP_MOD => "OP_MOD",
        OP_LSHIFT => "OP_LSHIFT",
        OP_RSHIFT => "OP_RSHIFT",
        OP_BOOLAND => "OP_BOOLAND",
        OP_BOOLOR => "OP_BOOLOR",
        OP_NUMEQUAL => "OP_NUMEQUAL",
        OP_NUMEQUALVERIFY => "OP_NUMEQUALVERIFY",
        OP_NUMNOTEQUAL => "OP_NUMNOTEQUAL",
        OP_LESSTHAN => "OP_LESSTHAN",
        OP_GREATERTHAN => "OP_GREATERTHAN",
        OP_LESSTHANOREQUAL => "OP_LESSTHANOREQUAL",
        OP_GREATERTHANOREQUAL => "OP_GREATERTHANOREQUAL",
        OP_MIN => "OP_MIN",
        OP_MAX => "OP_MAX",
        OP_WITHIN => "OP_WITHIN",
        OP_RIPEMD160 => "OP_RIPEMD160",
        OP_SHA1 => "OP_SHA1",
        OP_SHA256 => "OP_SHA256",
        OP_HASH160 => "OP_HASH160",
        OP_HASH256 => "OP_HASH256",
        OP_CODESEPARATOR => "OP_CODESEPARATOR",
        OP_CHECKSIG => "OP_CHECKSIG",
        OP_CHECKSIGVERIFY => "OP_CHECKSIGVERIFY",
        OP_CHECKMULTISIG => "OP_CHECKMULTISIG",
        OP_CHECKMULTISIGVERIFY => "OP_CHECKMULTISIGVERIFY",
        OP_NOP1 => "OP_NOP1",
        OP_CHECKLOCKTIMEVERIFY => "OP_CHECKLOCKTIMEVERIFY",
        OP_CHECKSEQUENCEVERIFY => "OP_CHECKSEQUENCEVERIFY",
        OP_NOP4 => "OP_NOP4",
        OP_NOP5 => "OP_NOP5",
        OP_NOP6 => "OP_NOP6",
        OP_NOP7 => "OP_NOP7",
        OP_NOP8 => "OP_NOP8",
        OP_NOP9 => "OP_NOP9",
        OP_NOP10 => "OP_NOP10",
        _ => return None,
    };
    Some(s)
}

/// Parses an opcode display name back to its byte value.
#[must_use]
pub fn from_name(s: &str) -> Option<u8> {
    for op in 0..=u8::MAX {
        if name(op) == Some(s) {
            return Some(op);
        }
    }
    None
}

/// Gets the next operation index in the script, or the script length if at
/// the end.
#[must_use]
pub fn next_op(i: usize, script: &[u8]) -> usize {
    if i >= script.len() {
        return script.len();
    }
    let op = script[i];
    match op {
        len @ 1..=75 => i + 1 + len as usize,
        OP_PUSHDATA1 => {
            if i + 2 > script.len() {
                script.len()
            } else {
                i + 2 + script[i + 1] as usize
            }
        }
        OP_PUSHDATA2 => {
            if i + 3 > script.len() {
                script.len()
            } else {
                i + 3 + u16::from_le_bytes([script[i + 1], script[i + 2]]) as usize
            }
        }
        OP_PUSHDATA4 => {
            if i + 5 > script.len() {
                script.len()
            } else {
                i + 5
                    + u32::from_le_bytes([
                        script[i + 1],
                        script[i + 2],
                        script[i + 3],
                        script[i + 4],
                    ]) as usize
            }
        }
        _ => i + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn names_round_trip() {
        assert_eq!(name(OP_DUP), Some("OP_DUP"));
        assert_eq!(from_name("OP_DUP"), Some(OP_DUP));
        assert_eq!(name(OP_CHECKSIG), Some("OP_CHECKSIG"));
        assert_eq!(from_name("OP_CHECKSIG"), Some(OP_CHECKSIG));
        assert_eq!(name(42), None);
        assert_eq!(from_name("OP_BOGUS"), None);
    }

    #[test]
    fn next_op_walks_pushes() {
        // direct push of 3 bytes then OP_DUP
        let script = [3u8, 1, 2, 3, OP_DUP];
        assert_eq!(next_op(0, &script), 4);
        assert_eq!(next_op(4, &script), 5);
        // pushdata1
        let script = [OP_PUSHDATA1, 2, 9, 9, OP_DROP];
        assert_eq!(next_op(0, &script), 4);
        // truncated pushdata clamps to end
        let script = [OP_PUSHDATA1];
        assert_eq!(next_op(0, &script), 1);
    }
}
