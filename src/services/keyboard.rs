//! 键盘布局数据
//!
//! 用于打字错误的相邻键以及填空兜底答案的连续键簇。

use phf::phf_map;
use rand::Rng;

/// QWERTY 字母行
pub const KEY_ROWS: [&str; 3] = ["qwertyuiop", "asdfghjkl", "zxcvbnm"];

/// 每个字母在 QWERTY 布局上的相邻键
static NEIGHBORS: phf::Map<char, &'static str> = phf_map! {
    'q' => "wa", 'w' => "qeas", 'e' => "wrsd", 'r' => "etdf", 't' => "ryfg",
    'y' => "tugh", 'u' => "yihj", 'i' => "uojk", 'o' => "ipkl", 'p' => "ol",
    'a' => "qwsz", 's' => "awedxz", 'd' => "serfcx", 'f' => "drtgvc", 'g' => "ftyhbv",
    'h' => "gyujnb", 'j' => "huikmn", 'k' => "jiolm", 'l' => "kop",
    'z' => "asx", 'x' => "zsdc", 'c' => "xdfv", 'v' => "cfgb", 'b' => "vghn",
    'n' => "bhjm", 'm' => "njk",
};

/// 返回与 `c` 相邻的一个错键，保留大小写；非字母时随机给一个小写字母
pub fn neighbor_key<R: Rng + ?Sized>(c: char, rng: &mut R) -> char {
    let lower = c.to_ascii_lowercase();
    let wrong = match NEIGHBORS.get(&lower) {
        Some(keys) => {
            let keys: Vec<char> = keys.chars().collect();
            keys[rng.random_range(0..keys.len())]
        }
        None => char::from(b'a' + rng.random_range(0..26u8)),
    };
    if c.is_ascii_uppercase() {
        wrong.to_ascii_uppercase()
    } else {
        wrong
    }
}

/// 由连续键簇拼出长度为 `len` 的字符串
///
/// 每个键簇取自同一字母行的连续 2~4 个键，看起来像真实的按键序列。
pub fn cluster_word<R: Rng + ?Sized>(len: usize, rng: &mut R) -> String {
    let mut out = String::with_capacity(len);
    while out.len() < len {
        let row = KEY_ROWS[rng.random_range(0..KEY_ROWS.len())];
        let remaining = len - out.len();
        let run = rng.random_range(2..=4usize).min(remaining).min(row.len());
        let start = rng.random_range(0..=row.len() - run);
        out.push_str(&row[start..start + run]);
    }
    out
}
