//! Текстовое представление чисел, общее для JSON-энкодера и диагностического
//! вывода, и разбор числовых строк в духе `atol`/`atof`.

/// Количество значащих цифр при выводе вещественных чисел.
pub const REAL_PRECISION: usize = 12;

/// Конечный double в виде `%.12g`: фиксированная или экспоненциальная
/// запись, без хвостовых нулей.
pub fn format_real(x: f64) -> String {
    if x == 0.0 {
        return if x.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // Экспонента после округления до нужного числа значащих цифр.
    let sci = format!("{:.*e}", REAL_PRECISION - 1, x);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => return sci,
    };

    if exp < -4 || exp >= REAL_PRECISION as i32 {
        let mantissa = trim_fraction(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    } else {
        let decimals = (REAL_PRECISION as i32 - 1 - exp).max(0) as usize;
        trim_fraction(&format!("{x:.decimals$}")).to_string()
    }
}

/// Дописывает double в JSON: `null` для NaN и насыщающий литерал для
/// бесконечностей.
pub fn write_json_real(
    out: &mut String,
    x: f64,
) {
    if x.is_nan() {
        out.push_str("null");
    } else if x.is_infinite() {
        out.push_str(if x.is_sign_negative() {
            "-1e9999"
        } else {
            "1e9999"
        });
    } else {
        out.push_str(&format_real(x));
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Разбирает целое из начала строки; мусор после числа игнорируется, при
/// отсутствии цифр возвращается 0.
pub fn parse_integer_prefix(s: &str) -> i64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return 0;
    }
    match s[..end].parse::<i64>() {
        Ok(v) => v,
        Err(_) if bytes[0] == b'-' => i64::MIN,
        Err(_) => i64::MAX,
    }
}

/// Разбирает вещественное число из начала строки; при отсутствии числа
/// возвращает 0.
pub fn parse_real_prefix(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let mantissa_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == mantissa_start || &s[mantissa_start..end] == "." {
        return 0.0;
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > digits {
            end = exp_end;
        }
    }
    s[..end].parse::<f64>().unwrap_or(0.0)
}
