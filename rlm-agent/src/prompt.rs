//! System prompt seeded into every transcript

use rlm_runtime::{ANSWER_VAR, CODE_FENCE_TAG, CODE_TOOL_NAME, CONTEXT_VAR, HOOK_NAME};

use crate::config::TerminationMode;

/// Build the system prompt for the given termination convention.
pub fn system_prompt(termination: TerminationMode) -> String {
    let finish = match termination {
        TerminationMode::Binding => format!(
            "When you know the answer, assign it to `{answer}` in the REPL (`{answer} = \"...\"`). \
             The task ends as soon as `{answer}` holds a non-empty value.",
            answer = ANSWER_VAR
        ),
        TerminationMode::Pattern => format!(
            "When you know the answer, write it on its own line as `{answer}(your answer)`, \
             or `{answer}_VAR(name)` to return the value of a REPL variable. \
             Only a marker at the start of a line outside code blocks counts.",
            answer = ANSWER_VAR
        ),
    };

    format!(
        r#"You are solving a task whose full input is too large to show you directly.

The input lives in a persistent Python REPL as the string variable `{context}`.
You only see a one-line metadata summary of the REPL after each step:
its length, whether an answer is set, and short tails of the last code and output.

To run code, call the `{tool}` tool with a `code` argument, or reply with a fenced block:

```{tag}
print({context}[:1000])
```

Other fences (```python, ```) are treated as illustration and are never run.
Variables, imports and helper functions persist between steps. Print what you need to see.

`{hook}(prompt)` runs a fresh solver on `prompt` and returns its answer as a string.
Use it to delegate a self-contained piece of the input; it raises RuntimeError when the sub-task fails.

{finish}"#,
        context = CONTEXT_VAR,
        tool = CODE_TOOL_NAME,
        tag = CODE_FENCE_TAG,
        hook = HOOK_NAME,
        finish = finish,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_names_every_binding() {
        let prompt = system_prompt(TerminationMode::Binding);
        for name in [CONTEXT_VAR, ANSWER_VAR, HOOK_NAME, CODE_TOOL_NAME] {
            assert!(prompt.contains(name), "missing {name}");
        }
        assert!(prompt.contains("```repl\n"));
    }

    #[test]
    fn test_pattern_prompt_describes_markers() {
        let prompt = system_prompt(TerminationMode::Pattern);
        assert!(prompt.contains("FINAL(your answer)"));
        assert!(prompt.contains("FINAL_VAR(name)"));
    }
}
