use state_machines::state_machine;

state_machine! {
    name: GenerationMachine,
    state: GenerationState,
    initial: Ready,
    states: [Ready, Reviewed, Rewritten, Polished],
    events {
        review { transition: { from: Ready, to: Reviewed } }
        rewrite { transition: { from: Reviewed, to: Rewritten } }
        polish { transition: { from: Rewritten, to: Polished } }
    }
}

pub fn ready() -> GenerationMachine<(), Ready> {
    GenerationMachine::new(())
}
