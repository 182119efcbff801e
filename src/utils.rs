use crate::TemplateError;

/// Argument for a printf-style file template.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemplateArg<'a> {
    Str(&'a str),
    Int(i64),
}

impl std::fmt::Display for TemplateArg<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Default)]
struct Conversion {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    width: usize,
    precision: Option<usize>,
}

impl Conversion {
    fn pad(&self, body: String, sign: &str) -> String {
        let len = sign.len() + body.chars().count();
        if len >= self.width {
            return format!("{sign}{body}");
        }
        let fill = self.width - len;
        if self.left {
            format!("{sign}{body}{}", " ".repeat(fill))
        } else if self.zero && self.precision.is_none() {
            format!("{sign}{}{body}", "0".repeat(fill))
        } else {
            format!("{}{sign}{body}", " ".repeat(fill))
        }
    }
}

/// Expand a C printf-style template (`%s`, `%d`, `%i`, `%%` with flags
/// `-0+ `, width and precision), as used by areaDetector file plugins.
pub fn format_template(template: &str, args: &[TemplateArg]) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len() + 32);
    let mut chars = template.chars().peekable();
    let mut used = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut conv = Conversion::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => conv.left = true,
                '0' => conv.zero = true,
                '+' => conv.plus = true,
                ' ' => conv.space = true,
                _ => break,
            }
            chars.next();
        }
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            conv.width = conv.width * 10 + d as usize;
            chars.next();
        }
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut precision = 0;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                precision = precision * 10 + d as usize;
                chars.next();
            }
            conv.precision = Some(precision);
        }
        let conversion = chars
            .next()
            .ok_or_else(|| TemplateError::Truncated(template.to_string()))?;
        if conversion == '%' {
            out.push('%');
            continue;
        }
        if !matches!(conversion, 's' | 'd' | 'i') {
            return Err(TemplateError::Unsupported {
                template: template.to_string(),
                conversion,
            });
        }

        let arg = args.get(used).copied();
        used += 1;
        let Some(arg) = arg else {
            continue;
        };
        match (conversion, arg) {
            ('s', arg) => {
                let mut body = arg.to_string();
                if let Some(p) = conv.precision {
                    body = body.chars().take(p).collect();
                }
                out.push_str(&conv.pad(body, ""));
            }
            (_, TemplateArg::Int(v)) => {
                let mut digits = v.unsigned_abs().to_string();
                if let Some(p) = conv.precision {
                    if digits.len() < p {
                        digits = format!("{}{digits}", "0".repeat(p - digits.len()));
                    }
                }
                let sign = if v < 0 {
                    "-"
                } else if conv.plus {
                    "+"
                } else if conv.space {
                    " "
                } else {
                    ""
                };
                out.push_str(&conv.pad(digits, sign));
            }
            (_, TemplateArg::Str(_)) => {
                return Err(TemplateError::NotAnInteger(template.to_string()));
            }
        }
    }

    if used != args.len() {
        return Err(TemplateError::ArgumentCount {
            template: template.to_string(),
            expected: used,
            given: args.len(),
        });
    }
    Ok(out)
}

/// C `%.{precision}g` formatting.
pub fn format_g(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return if value.is_nan() {
            "nan".to_string()
        } else if value > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        };
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    let precision = precision.max(1);
    // Exponent after rounding to `precision` significant digits.
    let sci = format!("{:.*e}", precision - 1, value);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m.to_string(), e.parse::<i32>().unwrap_or(0)),
        None => (sci.clone(), 0),
    };

    if exp < -4 || exp >= precision as i32 {
        let mantissa = trim_fraction(&mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.unsigned_abs())
    } else {
        let decimals = (precision as i32 - 1 - exp).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, value))
    }
}

fn trim_fraction(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}
