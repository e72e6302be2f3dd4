//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了促销记录及其快照行解析规则。

use crate::error::ParseError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// 过期时间的规范格式
pub const EXPIRATION_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 以分为单位的价格
///
/// 始终按分向上取整，缓存中的价格不会低于快照中的价格
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price {
    cents: i64,
}

impl Price {
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    pub fn cents(&self) -> i64 {
        self.cents
    }

    pub fn as_f64(&self) -> f64 {
        self.cents as f64 / 100.0
    }

    /// 解析十进制价格，并向正无穷方向取整到分
    ///
    /// 只接受 `[+-]digits[.digits]` 形式，取整直接在十进制数字上完成，
    /// 不经过二进制浮点数，因此 `1.10` 不会变成 `1.11`。
    ///
    /// # 示例
    /// ```
    /// use promocache::promotion::Price;
    /// assert_eq!(Price::parse_ceil("1.001").unwrap().cents(), 101);
    /// assert_eq!(Price::parse_ceil("2.00").unwrap().to_string(), "2.00");
    /// ```
    pub fn parse_ceil(raw: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::InvalidPrice(raw.to_string());
        let text = raw.trim();

        let (negative, digits) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid())?
        };

        let mut frac = frac_part.bytes().map(|b| i64::from(b - b'0'));
        let tenths = frac.next().unwrap_or(0);
        let hundredths = frac.next().unwrap_or(0);
        let has_remainder = frac.any(|d| d != 0);

        let mut cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(tenths * 10 + hundredths))
            .ok_or_else(invalid)?;

        // 负数截断即为向上取整
        if negative {
            cents = -cents;
        } else if has_remainder {
            cents = cents.checked_add(1).ok_or_else(invalid)?;
        }

        Ok(Self { cents })
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        if !value.is_finite() {
            return Err(serde::de::Error::custom("price must be a finite number"));
        }
        Ok(Price::from_cents((value * 100.0).round() as i64))
    }
}

/// 促销记录
///
/// 存储时以 `id` 为键，值为 JSON 对象
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: String,
    pub price: Price,
    #[serde(with = "expiration_format")]
    pub expiration_date: NaiveDateTime,
}

mod expiration_format {
    use super::EXPIRATION_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(EXPIRATION_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, EXPIRATION_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// 解析一行快照数据
///
/// 行格式为 `id,price,YYYY-MM-DD HH:MM:SS ±HHMM`，必须恰好三个字段。
/// 时区偏移只被丢弃，不参与换算。
pub fn parse_line(line: &str) -> Result<Promotion, ParseError> {
    let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != 3 {
        return Err(ParseError::MalformedLine(format!(
            "expected 3 fields, got {}",
            fields.len()
        )));
    }

    let id = fields[0].trim();
    if id.is_empty() {
        return Err(ParseError::MalformedLine("empty id".to_string()));
    }

    let price = Price::parse_ceil(fields[1])?;
    let expiration_date = parse_expiration(fields[2])?;

    Ok(Promotion {
        id: id.to_string(),
        price,
        expiration_date,
    })
}

/// 解析带偏移量的过期时间
///
/// 最后一个空格之后的偏移量被直接丢弃，墙上时间原样保留
pub fn parse_expiration(raw: &str) -> Result<NaiveDateTime, ParseError> {
    let raw = raw.trim();
    let (wall_clock, _offset) = raw
        .rsplit_once(' ')
        .ok_or_else(|| ParseError::InvalidTimestamp(raw.to_string()))?;

    NaiveDateTime::parse_from_str(wall_clock.trim_end(), EXPIRATION_FORMAT)
        .map_err(|e| ParseError::InvalidTimestamp(format!("{}: {}", raw, e)))
}
