use paywall::{
    auth::UserId,
    recharge::{OrderId, OrderStatus, PaymentMethod, PlanId},
    resources::ResourceId,
};
use std::fmt;

/// A command typed at the client prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    Register { username: String, password: String },
    Login { username: String, password: String },
    Logout,
    Me,
    Balance,
    History { skip: i64, limit: i64 },
    Plans,
    /// Open a payment session for a plan
    Recharge(PlanId),
    /// Select the payment method of the open session
    Pay(PaymentMethod),
    /// Confirm payment of the open session, with an optional proof URL
    Paid(Option<String>),
    /// Dismiss the open session
    Close,
    Orders,
    Watch(OrderId),
    View(ResourceId),
    Buy(ResourceId),
    Publish {
        points: i64,
        title: String,
        content: String,
    },
    Review {
        order_id: OrderId,
        status: Option<OrderStatus>,
        note: Option<String>,
    },
    Adjust {
        user_id: UserId,
        amount: i64,
        description: String,
    },
}

/// Errors that can occur during command parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Argument is not a valid id or amount.
    InvalidNumber(String),
    /// Unknown payment method.
    InvalidPaymentMethod(String),
    /// Required arguments are missing; holds the usage line.
    MissingArgument(&'static str),
    /// Unrecognized command.
    UnrecognizedCommand(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNumber(value) => {
                write!(f, "Invalid number '{}'. Expected a whole number", value)
            }
            Self::InvalidPaymentMethod(value) => write!(
                f,
                "Unknown payment method '{}'. Use 'wechat' or 'alipay'",
                value
            ),
            Self::MissingArgument(usage) => write!(f, "Missing argument. Usage: {}", usage),
            Self::UnrecognizedCommand(cmd) => write!(
                f,
                "Unrecognized command '{}'. Type 'help' to see available commands",
                cmd
            ),
        }
    }
}

impl std::error::Error for ParseError {}

pub const HELP_TEXT: &str = "\
Commands:
  register USER PASS            Create an account and log in
  login USER PASS               Log in
  logout                        Forget the stored token
  me                            Profile, balance and unlocked resources
  balance                       Refetch the balance
  history [SKIP] [LIMIT]        Point transactions, newest first
  plans                         Recharge plans
  recharge PLAN                 Start paying for a plan
  pay wechat|alipay             Show the QR code of a payment method
  paid [PROOF_URL]              Confirm payment and submit the order
  close                         Dismiss the payment session
  orders                        Your recharge orders
  watch ORDER                   Wait for an administrator decision
  view RESOURCE                 Show a resource
  buy RESOURCE                  Unlock a resource with points
  publish POINTS TITLE | BODY   Publish a resource (0 points = free)
  review ORDER approve|reject|note [NOTE]   Decide an order (admin)
  adjust USER AMOUNT REASON     Manual ledger correction (admin)
  help                          This help
  quit                          Exit";

/// Parse a line typed at the prompt.
///
/// # Examples
///
/// ```
/// use pw_client::commands::{Command, parse_command};
///
/// assert_eq!(parse_command("balance"), Ok(Command::Balance));
/// assert_eq!(parse_command("buy 3"), Ok(Command::Buy(3)));
/// ```
pub fn parse_command(input: &str) -> Result<Command, ParseError> {
    let trimmed = input.trim();

    // Try single-word commands first
    match trimmed {
        "help" | "?" => return Ok(Command::Help),
        "quit" | "exit" => return Ok(Command::Quit),
        "logout" => return Ok(Command::Logout),
        "me" => return Ok(Command::Me),
        "balance" => return Ok(Command::Balance),
        "plans" => return Ok(Command::Plans),
        "close" => return Ok(Command::Close),
        "orders" => return Ok(Command::Orders),
        _ => {}
    }

    // Parse multi-word commands
    let parts: Vec<&str> = trimmed.split_ascii_whitespace().collect();
    match parts.first() {
        Some(&"register") => {
            let (username, password) = credentials(&parts, "register USER PASS")?;
            Ok(Command::Register { username, password })
        }
        Some(&"login") => {
            let (username, password) = credentials(&parts, "login USER PASS")?;
            Ok(Command::Login { username, password })
        }
        Some(&"history") => parse_history_command(&parts),
        Some(&"recharge") => Ok(Command::Recharge(number(&parts, 1, "recharge PLAN")?)),
        Some(&"pay") => parse_pay_command(&parts),
        Some(&"paid") => Ok(Command::Paid(parts.get(1).map(|p| p.to_string()))),
        Some(&"watch") => Ok(Command::Watch(number(&parts, 1, "watch ORDER")?)),
        Some(&"view") => Ok(Command::View(number(&parts, 1, "view RESOURCE")?)),
        Some(&"buy") => Ok(Command::Buy(number(&parts, 1, "buy RESOURCE")?)),
        Some(&"publish") => parse_publish_command(trimmed, &parts),
        Some(&"review") => parse_review_command(&parts),
        Some(&"adjust") => parse_adjust_command(&parts),
        _ => Err(ParseError::UnrecognizedCommand(trimmed.to_string())),
    }
}

fn credentials(parts: &[&str], usage: &'static str) -> Result<(String, String), ParseError> {
    match (parts.get(1), parts.get(2)) {
        (Some(username), Some(password)) => Ok((username.to_string(), password.to_string())),
        _ => Err(ParseError::MissingArgument(usage)),
    }
}

fn number<T: std::str::FromStr>(
    parts: &[&str],
    index: usize,
    usage: &'static str,
) -> Result<T, ParseError> {
    let value = parts
        .get(index)
        .ok_or(ParseError::MissingArgument(usage))?;
    value
        .parse()
        .map_err(|_| ParseError::InvalidNumber(value.to_string()))
}

/// Parse "history [SKIP] [LIMIT]"
fn parse_history_command(parts: &[&str]) -> Result<Command, ParseError> {
    let skip = match parts.get(1) {
        Some(_) => number(parts, 1, "history [SKIP] [LIMIT]")?,
        None => 0,
    };
    let limit = match parts.get(2) {
        Some(_) => number(parts, 2, "history [SKIP] [LIMIT]")?,
        None => paywall::ledger::models::DEFAULT_PAGE_SIZE,
    };
    Ok(Command::History { skip, limit })
}

/// Parse "pay wechat|alipay"
fn parse_pay_command(parts: &[&str]) -> Result<Command, ParseError> {
    let value = parts
        .get(1)
        .ok_or(ParseError::MissingArgument("pay wechat|alipay"))?;
    value
        .parse()
        .map(Command::Pay)
        .map_err(|_| ParseError::InvalidPaymentMethod(value.to_string()))
}

/// Parse "publish POINTS TITLE | BODY"
fn parse_publish_command(line: &str, parts: &[&str]) -> Result<Command, ParseError> {
    const USAGE: &str = "publish POINTS TITLE | BODY";

    let points = number(parts, 1, USAGE)?;
    let rest = line.strip_prefix("publish").unwrap_or(line).trim_start();
    let rest = rest.strip_prefix(parts[1]).unwrap_or(rest).trim();

    let (title, content) = rest.split_once('|').ok_or(ParseError::MissingArgument(USAGE))?;
    let (title, content) = (title.trim(), content.trim());
    if title.is_empty() || content.is_empty() {
        return Err(ParseError::MissingArgument(USAGE));
    }

    Ok(Command::Publish {
        points,
        title: title.to_string(),
        content: content.to_string(),
    })
}

/// Parse "review ORDER approve|reject|note [NOTE]"
fn parse_review_command(parts: &[&str]) -> Result<Command, ParseError> {
    const USAGE: &str = "review ORDER approve|reject|note [NOTE]";

    let order_id = number(parts, 1, USAGE)?;
    let status = match parts.get(2) {
        Some(&"approve") => Some(OrderStatus::Approved),
        Some(&"reject") => Some(OrderStatus::Rejected),
        Some(&"note") => None,
        _ => return Err(ParseError::MissingArgument(USAGE)),
    };
    let note = (parts.len() > 3).then(|| parts[3..].join(" "));
    if status.is_none() && note.is_none() {
        return Err(ParseError::MissingArgument(USAGE));
    }

    Ok(Command::Review {
        order_id,
        status,
        note,
    })
}

/// Parse "adjust USER AMOUNT REASON"
fn parse_adjust_command(parts: &[&str]) -> Result<Command, ParseError> {
    const USAGE: &str = "adjust USER AMOUNT REASON";

    let user_id = number(parts, 1, USAGE)?;
    let amount = number(parts, 2, USAGE)?;
    if parts.len() < 4 {
        return Err(ParseError::MissingArgument(USAGE));
    }

    Ok(Command::Adjust {
        user_id,
        amount,
        description: parts[3..].join(" "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // === Single-word command tests ===

    #[test]
    fn test_parse_single_words() {
        assert_eq!(parse_command("help"), Ok(Command::Help));
        assert_eq!(parse_command("exit"), Ok(Command::Quit));
        assert_eq!(parse_command("me"), Ok(Command::Me));
        assert_eq!(parse_command("plans"), Ok(Command::Plans));
        assert_eq!(parse_command("orders"), Ok(Command::Orders));
    }

    #[test]
    fn test_parse_with_surrounding_whitespace() {
        assert_eq!(parse_command("  balance  "), Ok(Command::Balance));
    }

    // === Account commands ===

    #[test]
    fn test_parse_login() {
        assert_eq!(
            parse_command("login alice Secret123"),
            Ok(Command::Login {
                username: "alice".to_string(),
                password: "Secret123".to_string()
            })
        );
        assert!(matches!(
            parse_command("register alice"),
            Err(ParseError::MissingArgument(_))
        ));
    }

    // === Ledger commands ===

    #[test]
    fn test_parse_history_defaults() {
        assert_eq!(
            parse_command("history"),
            Ok(Command::History { skip: 0, limit: 50 })
        );
        assert_eq!(
            parse_command("history 10 5"),
            Ok(Command::History { skip: 10, limit: 5 })
        );
        assert!(matches!(
            parse_command("history ten"),
            Err(ParseError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_parse_adjust() {
        assert_eq!(
            parse_command("adjust 4 -20 duplicate charge"),
            Ok(Command::Adjust {
                user_id: 4,
                amount: -20,
                description: "duplicate charge".to_string()
            })
        );
        assert!(matches!(
            parse_command("adjust 4 -20"),
            Err(ParseError::MissingArgument(_))
        ));
    }

    // === Recharge commands ===

    #[test]
    fn test_parse_payment_flow() {
        assert_eq!(parse_command("recharge 2"), Ok(Command::Recharge(2)));
        assert_eq!(
            parse_command("pay alipay"),
            Ok(Command::Pay(PaymentMethod::Alipay))
        );
        assert!(matches!(
            parse_command("pay paypal"),
            Err(ParseError::InvalidPaymentMethod(_))
        ));
        assert_eq!(parse_command("paid"), Ok(Command::Paid(None)));
        assert_eq!(
            parse_command("paid https://img.example/p.png"),
            Ok(Command::Paid(Some("https://img.example/p.png".to_string())))
        );
    }

    #[test]
    fn test_parse_review() {
        assert_eq!(
            parse_command("review 9 reject amount mismatch"),
            Ok(Command::Review {
                order_id: 9,
                status: Some(OrderStatus::Rejected),
                note: Some("amount mismatch".to_string())
            })
        );
        assert_eq!(
            parse_command("review 9 approve"),
            Ok(Command::Review {
                order_id: 9,
                status: Some(OrderStatus::Approved),
                note: None
            })
        );
        assert!(matches!(
            parse_command("review 9 note"),
            Err(ParseError::MissingArgument(_))
        ));
    }

    // === Resource commands ===

    #[test]
    fn test_parse_publish() {
        assert_eq!(
            parse_command("publish 60 Rust tips | Use the borrow checker"),
            Ok(Command::Publish {
                points: 60,
                title: "Rust tips".to_string(),
                content: "Use the borrow checker".to_string()
            })
        );
        assert!(matches!(
            parse_command("publish 60 Rust tips"),
            Err(ParseError::MissingArgument(_))
        ));
    }

    #[test]
    fn test_parse_buy_requires_id() {
        assert_eq!(parse_command("buy 3"), Ok(Command::Buy(3)));
        assert!(matches!(
            parse_command("buy"),
            Err(ParseError::MissingArgument(_))
        ));
        assert!(matches!(
            parse_command("buy three"),
            Err(ParseError::InvalidNumber(_))
        ));
    }

    // === Error cases ===

    #[test]
    fn test_parse_unrecognized_command() {
        assert!(matches!(
            parse_command("dance"),
            Err(ParseError::UnrecognizedCommand(_))
        ));
        assert!(matches!(
            parse_command("   "),
            Err(ParseError::UnrecognizedCommand(_))
        ));
    }

    #[test]
    fn test_error_message_unrecognized_command() {
        let msg = ParseError::UnrecognizedCommand("xyz".to_string()).to_string();
        assert!(msg.contains("Unrecognized command"));
        assert!(msg.contains("xyz"));
        assert!(msg.contains("help"));
    }
}
