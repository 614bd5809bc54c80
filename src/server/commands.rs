/// Commands understood by the control-connection interpreter.
///
/// Verbs outside this set are kept with their uppercased spelling so the
/// dispatcher can echo them back in the 500 reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FtpCommand {
  User(String),
  Pass(String),
  Syst,
  Quit,
  Pwd(String),
  Cwd(String),
  Type(String),
  Pasv,
  Epsv,
  Stor(String),
  Retr(String),
  List,
  Mkd(String),
  Rmd(String),
  Dele(String),
  Size(String),
  Unknown(String),
}

impl FtpCommand {
  /// USER, PASS, SYST and QUIT are usable before login; unknown verbs are
  /// reported as unknown rather than gated.
  pub fn requires_login(&self) -> bool {
    !matches!(
      self,
      FtpCommand::User(_)
        | FtpCommand::Pass(_)
        | FtpCommand::Syst
        | FtpCommand::Quit
        | FtpCommand::Unknown(_)
    )
  }
}

/// Splits one control line into an uppercased verb and its raw argument.
///
/// The line is trimmed of surrounding whitespace (including the CRLF
/// terminator) and split on the first space; everything after that space is
/// passed through untouched. An all-whitespace line yields `None` and is
/// ignored without a reply.
pub fn parse_command(line: &str) -> Option<FtpCommand> {
  let line = line.trim();
  if line.is_empty() {
    return None;
  }
  let (verb, arg) = match line.split_once(' ') {
    Some((verb, arg)) => (verb.to_ascii_uppercase(), arg.to_string()),
    None => (line.to_ascii_uppercase(), String::new()),
  };
  Some(match verb.as_str() {
    "USER" => FtpCommand::User(arg),
    "PASS" => FtpCommand::Pass(arg),
    "SYST" => FtpCommand::Syst,
    "QUIT" => FtpCommand::Quit,
    "PWD" => FtpCommand::Pwd(arg),
    "CWD" => FtpCommand::Cwd(arg),
    "TYPE" => FtpCommand::Type(arg),
    "PASV" => FtpCommand::Pasv,
    "EPSV" => FtpCommand::Epsv,
    "STOR" => FtpCommand::Stor(arg),
    "RETR" => FtpCommand::Retr(arg),
    "LIST" => FtpCommand::List,
    "MKD" => FtpCommand::Mkd(arg),
    "RMD" => FtpCommand::Rmd(arg),
    "DELE" => FtpCommand::Dele(arg),
    "SIZE" => FtpCommand::Size(arg),
    _ => FtpCommand::Unknown(verb),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_verb_and_argument() {
    assert_eq!(
      parse_command("USER admin\r\n"),
      Some(FtpCommand::User("admin".to_string()))
    );
    assert_eq!(
      parse_command("STOR uploadfile.txt\r\n"),
      Some(FtpCommand::Stor("uploadfile.txt".to_string()))
    );
    assert_eq!(parse_command("PASV\r\n"), Some(FtpCommand::Pasv));
  }

  #[test]
  fn uppercases_the_verb_but_not_the_argument() {
    assert_eq!(
      parse_command("retr Some File.txt\r\n"),
      Some(FtpCommand::Retr("Some File.txt".to_string()))
    );
  }

  #[test]
  fn splits_on_the_first_space_only() {
    assert_eq!(
      parse_command("CWD dir with  spaces\r\n"),
      Some(FtpCommand::Cwd("dir with  spaces".to_string()))
    );
  }

  #[test]
  fn blank_lines_are_ignored() {
    assert_eq!(parse_command("\r\n"), None);
    assert_eq!(parse_command("   \r\n"), None);
    assert_eq!(parse_command(""), None);
  }

  #[test]
  fn unknown_verbs_keep_their_uppercased_spelling() {
    assert_eq!(
      parse_command("I'msupperman\r\n"),
      Some(FtpCommand::Unknown("I'MSUPPERMAN".to_string()))
    );
  }

  #[test]
  fn login_gate_exempts_auth_commands() {
    assert!(!parse_command("USER a").unwrap().requires_login());
    assert!(!parse_command("PASS a").unwrap().requires_login());
    assert!(!parse_command("SYST").unwrap().requires_login());
    assert!(!parse_command("QUIT").unwrap().requires_login());
    assert!(!parse_command("NOPE").unwrap().requires_login());
    assert!(parse_command("PWD").unwrap().requires_login());
    assert!(parse_command("STOR f").unwrap().requires_login());
    assert!(parse_command("PASV").unwrap().requires_login());
  }
}
