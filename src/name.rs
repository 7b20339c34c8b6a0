//! Имена каналов: неизменяемые байтовые строки с кешированным 64-битным
//! символьным идентификатором.
//!
//! Все имена проходят через глобальный intern-пул, поэтому одинаковые имена
//! указывают на один и тот же объект — сравнение на равенство в горячем
//! пути сводится к сравнению указателей, а затем символьных id.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use siphasher::sip::SipHasher;

/// Пул для повторного использования имён каналов. Crate-private:
/// модули внутри крейта видят только готовые [`Name`].
static NAME_INTERN: Lazy<DashMap<Bytes, Name>> = Lazy::new(DashMap::new);

// фиксированные ключи SipHash: символьные id стабильны между запусками
const SYM_KEY_0: u64 = 0x736f_6d65_7073_6575;
const SYM_KEY_1: u64 = 0x646f_7261_6e64_6f6d;

/// Имя канала или шаблона. Дёшево клонируется (внутри `Arc`).
///
/// Равенство по значению — это равенство байтов; одинаковые имена после
/// интернирования ещё и идентичны по указателю.
#[derive(Clone)]
pub struct Name(Arc<NameInner>);

struct NameInner {
    bytes: Bytes,
    sym: u64,
}

impl Name {
    /// Возвращает interned имя для данной байтовой строки.
    /// При первом обращении создаёт объект и кладёт его в пул.
    pub fn new(name: impl AsRef<[u8]>) -> Self {
        let raw = name.as_ref();
        if let Some(existing) = NAME_INTERN.get(raw) {
            return existing.clone();
        }
        let bytes = Bytes::copy_from_slice(raw);
        NAME_INTERN
            .entry(bytes.clone())
            .or_insert_with(|| {
                Name(Arc::new(NameInner {
                    sym: symbol_id(&bytes),
                    bytes,
                }))
            })
            .clone()
    }

    /// Стабильный 64-битный символьный идентификатор имени.
    /// Одинаковые байты всегда дают одинаковый id.
    #[inline]
    pub fn sym(&self) -> u64 {
        self.0.sym
    }

    /// Байтовое представление имени.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0.bytes
    }

    /// Длина имени в байтах.
    pub fn len(&self) -> usize {
        self.0.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.bytes.is_empty()
    }

    /// Идентичность по указателю (fast-path равенства).
    pub(crate) fn ptr_eq(&self, other: &Name) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

fn symbol_id(bytes: &[u8]) -> u64 {
    let mut hasher = SipHasher::new_with_keys(SYM_KEY_0, SYM_KEY_1);
    hasher.write(bytes);
    hasher.finish()
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || (self.0.sym == other.0.sym && self.0.bytes == other.0.bytes)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // композитный ключ (u64, имя): в hash-таблицу уходит только id,
        // байты участвуют в проверке равенства
        state.write_u64(self.0.sym);
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0.bytes))
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({:?})", String::from_utf8_lossy(&self.0.bytes))
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::new(s.as_bytes())
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Name::new(s.as_bytes())
    }
}

impl From<&[u8]> for Name {
    fn from(b: &[u8]) -> Self {
        Name::new(b)
    }
}
