//! Built-in scenario commands.
use super::{Handler, Params, Statement, Syntax, Translator};
use crate::scenario::WorkUnit;
use crate::user::{Lifecycle, UserMode};
use stampede_core::{CompileError, MAX_WORK_UNITS};
use std::time::Duration;

type Compiled = Result<Option<WorkUnit>, CompileError>;

pub(super) const BUILTIN: &[(&str, Syntax, Handler)] = &[
    ("createusers", Syntax::Simple, create_users),
    ("createusersovertime", Syntax::Simple, create_users_over_time),
    ("createcycledusers", Syntax::Simple, create_cycled_users),
    ("createcycledusersovertime", Syntax::Simple, create_cycled_users_over_time),
    ("removecycledusers", Syntax::Simple, remove_cycled_users),
    ("removecycledusersovertime", Syntax::Simple, remove_cycled_users_over_time),
    ("createloopedusers", Syntax::Simple, create_looped_users),
    ("createloopedusersovertime", Syntax::Simple, create_looped_users_over_time),
    ("removeloopedusers", Syntax::Simple, remove_looped_users),
    ("removeloopedusersovertime", Syntax::Simple, remove_looped_users_over_time),
    ("delay", Syntax::Simple, delay),
    ("repeat", Syntax::Block, repeat),
    ("waitforallclientstofinish", Syntax::Simple, wait_for_all_clients_to_finish),
];

fn create(statement: &Statement<'_>, mode: UserMode, timed: bool) -> Compiled {
    let params = Params::parse(statement)?;
    let amount = params.required("amount")?;
    let lifecycle = match mode {
        UserMode::Regular => Lifecycle::Regular,
        UserMode::Looped => Lifecycle::Looped,
        UserMode::Cycled => Lifecycle::Cycled {
            cycles: params.required("cyclestorun")?,
        },
    };
    let over = timed.then(|| spread(&params, amount)).transpose()?;

    Ok(Some(WorkUnit::Create {
        amount,
        lifecycle,
        over,
    }))
}

fn remove(statement: &Statement<'_>, mode: UserMode, timed: bool) -> Compiled {
    let params = Params::parse(statement)?;
    let amount = params.required("amount")?;
    let over = timed.then(|| spread(&params, amount)).transpose()?;

    Ok(Some(WorkUnit::Remove { amount, mode, over }))
}

fn spread(params: &Params<'_>, amount: usize) -> Result<Duration, CompileError> {
    if amount == 0 {
        return Err(CompileError::ZeroAmount {
            statement: params.statement().to_string(),
        });
    }
    params.duration()
}

fn create_users(statement: &Statement<'_>, _: &Translator, _: &mut Vec<WorkUnit>) -> Compiled {
    create(statement, UserMode::Regular, false)
}

fn create_users_over_time(
    statement: &Statement<'_>,
    _: &Translator,
    _: &mut Vec<WorkUnit>,
) -> Compiled {
    create(statement, UserMode::Regular, true)
}

fn create_cycled_users(
    statement: &Statement<'_>,
    _: &Translator,
    _: &mut Vec<WorkUnit>,
) -> Compiled {
    create(statement, UserMode::Cycled, false)
}

fn create_cycled_users_over_time(
    statement: &Statement<'_>,
    _: &Translator,
    _: &mut Vec<WorkUnit>,
) -> Compiled {
    create(statement, UserMode::Cycled, true)
}

fn remove_cycled_users(
    statement: &Statement<'_>,
    _: &Translator,
    _: &mut Vec<WorkUnit>,
) -> Compiled {
    remove(statement, UserMode::Cycled, false)
}

fn remove_cycled_users_over_time(
    statement: &Statement<'_>,
    _: &Translator,
    _: &mut Vec<WorkUnit>,
) -> Compiled {
    remove(statement, UserMode::Cycled, true)
}

fn create_looped_users(
    statement: &Statement<'_>,
    _: &Translator,
    _: &mut Vec<WorkUnit>,
) -> Compiled {
    create(statement, UserMode::Looped, false)
}

fn create_looped_users_over_time(
    statement: &Statement<'_>,
    _: &Translator,
    _: &mut Vec<WorkUnit>,
) -> Compiled {
    create(statement, UserMode::Looped, true)
}

fn remove_looped_users(
    statement: &Statement<'_>,
    _: &Translator,
    _: &mut Vec<WorkUnit>,
) -> Compiled {
    remove(statement, UserMode::Looped, false)
}

fn remove_looped_users_over_time(
    statement: &Statement<'_>,
    _: &Translator,
    _: &mut Vec<WorkUnit>,
) -> Compiled {
    remove(statement, UserMode::Looped, true)
}

fn delay(statement: &Statement<'_>, _: &Translator, _: &mut Vec<WorkUnit>) -> Compiled {
    let params = Params::parse(statement)?;
    Ok(Some(WorkUnit::Delay(params.duration()?)))
}

/// Expands its body `times` times into the enclosing output. Emits no unit of its own.
fn repeat(statement: &Statement<'_>, translator: &Translator, out: &mut Vec<WorkUnit>) -> Compiled {
    let params = Params::parse(statement)?;
    let times: u32 = params.required("times")?;
    let body = statement
        .body()
        .ok_or_else(|| statement.malformed("expected a '{...}' block"))?;

    // Compile once so errors surface even for `times:0`.
    let mut expanded = vec![];
    translator.compile_block(body, &mut expanded)?;

    let total = usize::try_from(times)
        .ok()
        .and_then(|times| expanded.len().checked_mul(times))
        .and_then(|units| units.checked_add(out.len()));
    if total.map_or(true, |total| total > MAX_WORK_UNITS) {
        return Err(CompileError::InvalidParameter {
            statement: params.statement().to_string(),
            parameter: "times".to_string(),
            value: times.to_string(),
        });
    }

    if !expanded.is_empty() {
        for _ in 0..times {
            out.extend(expanded.iter().cloned());
        }
    }

    Ok(None)
}

fn wait_for_all_clients_to_finish(
    _: &Statement<'_>,
    _: &Translator,
    _: &mut Vec<WorkUnit>,
) -> Compiled {
    Ok(Some(WorkUnit::WaitForAllClientsToFinish))
}
