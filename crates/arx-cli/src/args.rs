//! yay argument inspection
//!
//! arx takes yay's own command line. Only sync operations that install named
//! packages are analyzed; everything else is passed through untouched.

/// Sync sub-flags that make `-S` a query rather than an install
const NON_INSTALL_SHORT: &[char] = &['s', 'i', 'l', 'g', 'c', 'p'];

const NON_INSTALL_LONG: &[&str] = &["--search", "--info", "--list", "--groups", "--clean", "--print"];

/// pacman and yay options whose value is the next argument
const VALUE_LONG: &[&str] = &[
    "--arch",
    "--assume-installed",
    "--cachedir",
    "--color",
    "--config",
    "--dbpath",
    "--gpgdir",
    "--hookdir",
    "--ignore",
    "--ignoregroup",
    "--logfile",
    "--overwrite",
    "--print-format",
    "--root",
    "--sysroot",
    "--answerclean",
    "--answerdiff",
    "--answeredit",
    "--answerupgrade",
    "--aururl",
    "--aurrpcurl",
    "--builddir",
    "--completioninterval",
    "--editor",
    "--editorflags",
    "--git",
    "--gitflags",
    "--gpg",
    "--gpgflags",
    "--makepkg",
    "--makepkgconf",
    "--mflags",
    "--pacman",
    "--requestsplitn",
    "--searchby",
    "--sortby",
    "--sudo",
    "--sudoflags",
];

/// Short options whose value is the next argument (`-b` dbpath, `-r` root)
const VALUE_SHORT: &[&str] = &["-b", "-r"];

/// Whether the user asked for arx's own help
pub fn wants_help(args: &[String]) -> bool {
    args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help")
}

/// Arguments before the `--` terminator
fn options(args: &[String]) -> impl Iterator<Item = &String> + '_ {
    args.iter().take_while(|a| *a != "--")
}

fn short_flags(args: &[String]) -> impl Iterator<Item = char> + '_ {
    options(args)
        .filter(|a| a.starts_with('-') && !a.starts_with("--"))
        .flat_map(|a| a.chars().skip(1))
}

/// Whether the arguments describe a sync operation that installs packages
pub fn is_install(args: &[String]) -> bool {
    let is_sync = options(args).any(|a| a == "--sync") || short_flags(args).any(|c| c == 'S');
    if !is_sync {
        return false;
    }

    let is_query = short_flags(args).any(|c| NON_INSTALL_SHORT.contains(&c))
        || options(args).any(|a| NON_INSTALL_LONG.contains(&a.as_str()));
    !is_query
}

fn takes_value(arg: &str) -> bool {
    VALUE_LONG.contains(&arg) || VALUE_SHORT.contains(&arg)
}

/// Which arguments are operands rather than options or option values.
///
/// `--opt=value` carries its own value; everything after `--` is an operand.
fn operand_mask(args: &[String]) -> Vec<bool> {
    let mut mask = Vec::with_capacity(args.len());
    let mut expect_value = false;
    let mut options_done = false;

    for arg in args {
        if options_done {
            mask.push(true);
        } else if expect_value {
            expect_value = false;
            mask.push(false);
        } else if arg == "--" {
            options_done = true;
            mask.push(false);
        } else if arg.starts_with('-') {
            expect_value = takes_value(arg);
            mask.push(false);
        } else {
            mask.push(true);
        }
    }
    mask
}

/// Package names named by an install operation, in order, without duplicates
pub fn packages_to_install(args: &[String]) -> Vec<String> {
    if !is_install(args) {
        return Vec::new();
    }

    let mut packages: Vec<String> = Vec::new();
    for (arg, is_operand) in args.iter().zip(operand_mask(args)) {
        if is_operand && !packages.contains(arg) {
            packages.push(arg.clone());
        }
    }
    packages
}

/// The arguments with the given package names removed; option values stay
pub fn without_packages(args: &[String], drop: &[String]) -> Vec<String> {
    args.iter()
        .zip(operand_mask(args))
        .filter(|(arg, is_operand)| !*is_operand || !drop.contains(*arg))
        .map(|(arg, _)| arg.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_help() {
        assert!(wants_help(&[]));
        assert!(wants_help(&args("-S firefox --help")));
        assert!(!wants_help(&args("-S firefox")));
    }

    #[test]
    fn test_install_operations() {
        assert_eq!(packages_to_install(&args("-S firefox")), vec!["firefox"]);
        assert_eq!(
            packages_to_install(&args("-S --needed spotify discord")),
            vec!["spotify", "discord"]
        );
        assert_eq!(packages_to_install(&args("--sync yay-bin")), vec!["yay-bin"]);
        assert_eq!(packages_to_install(&args("-Syu brave-bin")), vec!["brave-bin"]);
        assert_eq!(packages_to_install(&args("-S a b a")), vec!["a", "b"]);
    }

    #[test]
    fn test_option_values_are_not_packages() {
        assert_eq!(
            packages_to_install(&args("-S --config /etc/pacman.conf --ignore linux firefox")),
            vec!["firefox"]
        );
        assert_eq!(
            packages_to_install(&args("-S --editor=vim --builddir /tmp/yay -b /var/lib/pacman brave-bin")),
            vec!["brave-bin"]
        );
        assert_eq!(packages_to_install(&args("-S --needed -- -weird")), vec!["-weird"]);
    }

    #[test]
    fn test_pass_through_operations() {
        assert!(packages_to_install(&args("-Ss firefox")).is_empty());
        assert!(packages_to_install(&args("-Si firefox")).is_empty());
        assert!(packages_to_install(&args("-S --search firefox")).is_empty());
        assert!(packages_to_install(&args("-Q firefox")).is_empty());
        assert!(packages_to_install(&args("-R firefox")).is_empty());
        assert!(packages_to_install(&args("-Syu")).is_empty());
        assert!(packages_to_install(&args("firefox")).is_empty());
    }

    #[test]
    fn test_without_packages() {
        let filtered = without_packages(&args("-S --needed ghost firefox"), &args("ghost"));
        assert_eq!(filtered, args("-S --needed firefox"));
        assert_eq!(without_packages(&args("-S firefox"), &[]), args("-S firefox"));
        assert_eq!(
            without_packages(&args("-S --ignore ghost ghost firefox"), &args("ghost")),
            args("-S --ignore ghost firefox")
        );
    }
}
